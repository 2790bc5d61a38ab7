//! Matcher extraction and metric-kind classification.
//!
//! A stored OpenTelemetry histogram surfaces as three Prometheus series
//! (`<name>_bucket`, `<name>_sum`, `<name>_count`). Classification maps the
//! requested `__name__` back to the stored base metric and remembers which of
//! those families the caller asked for.

use std::collections::BTreeMap;

use crate::proto::{LabelMatcher, MatchType};

/// Reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Reserved label carrying a histogram bucket's upper bound.
pub const BUCKET_BOUND_LABEL: &str = "le";

const BUCKET_SUFFIX: &str = "_bucket";
const SUM_SUFFIX: &str = "_sum";
const COUNT_SUFFIX: &str = "_count";

/// The series family a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// No histogram suffix. For histogram reconstruction this means every
    /// family is wanted.
    Scalar,
    Bucket,
    Sum,
    Count,
}

impl MetricKind {
    pub fn wants_buckets(self) -> bool {
        matches!(self, MetricKind::Scalar | MetricKind::Bucket)
    }

    pub fn wants_sum(self) -> bool {
        matches!(self, MetricKind::Scalar | MetricKind::Sum)
    }

    pub fn wants_count(self) -> bool {
        matches!(self, MetricKind::Scalar | MetricKind::Count)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Scalar => "scalar",
            MetricKind::Bucket => "bucket",
            MetricKind::Sum => "sum",
            MetricKind::Count => "count",
        }
    }
}

/// Equality matchers of one query, split into the reserved labels and the
/// remaining attribute filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatcherSet {
    pub metric_name: Option<String>,
    pub bucket_bound: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl MatcherSet {
    /// Collect equality matchers. Other operators are not supported and are
    /// dropped; a repeated label keeps its last value.
    pub fn from_matchers(matchers: &[LabelMatcher]) -> Self {
        let mut set = MatcherSet::default();
        for matcher in matchers {
            if matcher.match_type() != Some(MatchType::Eq) {
                tracing::debug!(
                    label = %matcher.name,
                    match_type = matcher.r#type,
                    "ignoring non-equality matcher"
                );
                continue;
            }
            match matcher.name.as_str() {
                METRIC_NAME_LABEL => {
                    set.metric_name = Some(matcher.value.clone()).filter(|v| !v.is_empty());
                }
                BUCKET_BOUND_LABEL => {
                    set.bucket_bound = Some(matcher.value.clone()).filter(|v| !v.is_empty());
                }
                _ => {
                    set.attributes
                        .insert(matcher.name.clone(), matcher.value.clone());
                }
            }
        }
        set
    }

    /// Classify the requested metric name; see [`classify`].
    pub fn classify(&self) -> (MetricKind, Option<&str>) {
        match self.metric_name.as_deref() {
            Some(name) => {
                let (kind, base) = classify(name);
                (kind, Some(base))
            }
            None => (MetricKind::Scalar, None),
        }
    }
}

/// Strip one histogram suffix (checked as `_bucket`, `_sum`, `_count`) from
/// `metric_name`, returning the requested family and the stored base name.
pub fn classify(metric_name: &str) -> (MetricKind, &str) {
    let suffixes = [
        (BUCKET_SUFFIX, MetricKind::Bucket),
        (SUM_SUFFIX, MetricKind::Sum),
        (COUNT_SUFFIX, MetricKind::Count),
    ];
    for (suffix, kind) in suffixes {
        if let Some(base) = metric_name.strip_suffix(suffix) {
            return (kind, base);
        }
    }
    (MetricKind::Scalar, metric_name)
}
