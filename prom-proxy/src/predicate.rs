//! Translation of equality matchers and a time range into a parameterized
//! `WHERE` expression.
//!
//! Values are always bound as positional arguments. Attribute names cannot be
//! bound (they select a map key inside the statement text), so they are escaped
//! for a single-quoted string literal before being embedded.

use std::collections::BTreeMap;

use crate::model::TimeRange;
use crate::warehouse::SqlArg;

/// Filter text plus its positional arguments, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub args: Vec<SqlArg>,
}

/// Build the filter for one time range.
///
/// Argument order is fixed: range start, range end, the metric name (when
/// given and non-empty), then one value per attribute in ascending name order.
pub fn build_predicate(
    range: TimeRange,
    metric_name: Option<&str>,
    attributes: &BTreeMap<String, String>,
) -> Predicate {
    let mut clauses =
        vec!["TimeUnix >= toDateTime64(?, 9) AND TimeUnix < toDateTime64(?, 9)".to_string()];
    let mut args = vec![SqlArg::Float(range.start), SqlArg::Float(range.end)];

    if let Some(name) = metric_name.filter(|n| !n.is_empty()) {
        clauses.push("MetricName = ?".to_string());
        args.push(SqlArg::Text(name.to_string()));
    }

    for (name, value) in attributes {
        clauses.push(format!("Attributes['{}'] = ?", escape_attribute_name(name)));
        args.push(SqlArg::Text(value.clone()));
    }

    Predicate {
        clause: clauses.join(" AND "),
        args,
    }
}

/// Escape an untrusted attribute name for a single-quoted literal.
///
/// Backslashes and quotes are backslash-escaped; `?` is doubled so the
/// warehouse client never reads it as a bind placeholder.
pub fn escape_attribute_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '?' => escaped.push_str("??"),
            _ => escaped.push(c),
        }
    }
    escaped
}
