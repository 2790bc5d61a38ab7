//! Statement construction and execution for the two read strategies.
//!
//! Scalar series are read across every retention tier that overlaps the
//! query, one `SELECT` per planned segment joined with `UNION ALL`.
//! Histogram-derived series (`_bucket`, `_sum`, `_count`) are read from the
//! raw histogram table in a single statement.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use serde::de::DeserializeOwned;

use crate::classify::MetricKind;
use crate::error::Result;
use crate::metrics::{Metrics, Strategy};
use crate::model::{HistogramRow, ScalarRow, TimeRange};
use crate::predicate::build_predicate;
use crate::retention::{Segment, TierTable};
use crate::warehouse::{Statement, Warehouse};

/// Column every tier query projects its point value as.
const VALUE_ALIAS: &str = "SumValue";

/// Decoded rows of one query, shaped by the strategy that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    Scalar(Vec<ScalarRow>),
    Histogram(Vec<HistogramRow>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::Scalar(rows) => rows.len(),
            Rows::Histogram(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single statement over the raw histogram table for the whole range.
pub fn build_detail_statement(
    histogram_table: &str,
    range: TimeRange,
    metric_name: Option<&str>,
    attributes: &BTreeMap<String, String>,
    max_rows: u64,
) -> Statement {
    let predicate = build_predicate(range, metric_name, attributes);
    let sql = format!(
        "SELECT MetricName, Attributes, toUnixTimestamp64Nano(TimeUnix) AS ts_ns, \
         Sum, Count, BucketCounts, ExplicitBounds \
         FROM {} WHERE {} ORDER BY ts_ns LIMIT {}",
        histogram_table, predicate.clause, max_rows
    );
    Statement::new(sql, predicate.args)
}

/// One `SELECT` per segment, unioned and ordered by timestamp.
///
/// Returns `None` when there are no segments; nothing should be executed.
pub fn build_tiered_statement(
    segments: &[Segment<'_>],
    metric_name: Option<&str>,
    attributes: &BTreeMap<String, String>,
    max_rows: u64,
) -> Option<Statement> {
    if segments.is_empty() {
        return None;
    }

    let mut selects = Vec::with_capacity(segments.len());
    let mut args = Vec::new();
    for segment in segments {
        let predicate = build_predicate(segment.range, metric_name, attributes);
        selects.push(format!(
            "SELECT MetricName, Attributes, toUnixTimestamp64Nano(TimeUnix) AS ts_ns, {} \
             FROM {} WHERE {}",
            value_expression(&segment.tier.value_column),
            segment.tier.table,
            predicate.clause
        ));
        args.extend(predicate.args);
    }

    let sql = format!(
        "SELECT MetricName, Attributes, ts_ns, {} FROM ({}) ORDER BY ts_ns LIMIT {}",
        VALUE_ALIAS,
        selects.join(" UNION ALL "),
        max_rows
    );
    Some(Statement::new(sql, args))
}

fn value_expression(column: &str) -> String {
    if column == VALUE_ALIAS {
        column.to_string()
    } else {
        format!("{} AS {}", column, VALUE_ALIAS)
    }
}

/// Chooses a strategy for each query, runs its statement and decodes the rows.
pub struct QueryDispatcher {
    warehouse: Arc<dyn Warehouse>,
    tiers: TierTable,
    histogram_table: String,
    max_rows: u64,
    metrics: Arc<Metrics>,
}

impl QueryDispatcher {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        tiers: TierTable,
        histogram_table: impl Into<String>,
        max_rows: u64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            warehouse,
            tiers,
            histogram_table: histogram_table.into(),
            max_rows,
            metrics,
        }
    }

    /// Fetch the rows for one classified query.
    ///
    /// `metric_name` is the full requested name for scalar queries and the
    /// stored base name for histogram families. An empty range, or one the
    /// tiers do not retain, produces no rows and executes nothing.
    pub async fn dispatch(
        &self,
        kind: MetricKind,
        metric_name: Option<&str>,
        attributes: &BTreeMap<String, String>,
        range: TimeRange,
        now: f64,
    ) -> Result<Rows> {
        let strategy = Strategy::for_kind(kind);
        self.metrics.record_query(strategy);

        match strategy {
            Strategy::Tiered => {
                let segments = self.tiers.plan(range, now);
                tracing::debug!(
                    metric = metric_name.unwrap_or_default(),
                    segments = segments.len(),
                    "dispatching tiered query"
                );
                let Some(statement) =
                    build_tiered_statement(&segments, metric_name, attributes, self.max_rows)
                else {
                    return Ok(Rows::Scalar(Vec::new()));
                };
                Ok(Rows::Scalar(self.fetch(statement).await?))
            }
            Strategy::Detail => {
                tracing::debug!(
                    metric = metric_name.unwrap_or_default(),
                    kind = kind.as_str(),
                    "dispatching histogram query"
                );
                if range.is_empty() {
                    return Ok(Rows::Histogram(Vec::new()));
                }
                let statement = build_detail_statement(
                    &self.histogram_table,
                    range,
                    metric_name,
                    attributes,
                    self.max_rows,
                );
                Ok(Rows::Histogram(self.fetch(statement).await?))
            }
        }
    }

    /// Execute `statement`, skipping rows that do not decode as `T`.
    async fn fetch<T: DeserializeOwned>(&self, statement: Statement) -> Result<Vec<T>> {
        self.metrics.warehouse_statements_total.inc();
        let mut stream = self.warehouse.query(statement).await?;

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            match serde_json::from_value::<T>(row) {
                Ok(decoded) => rows.push(decoded),
                Err(e) => {
                    tracing::warn!("skipping undecodable warehouse row: {}", e);
                    self.metrics.warehouse_rows_skipped_total.inc();
                }
            }
        }
        Ok(rows)
    }
}
