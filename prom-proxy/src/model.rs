//! Core data types shared by the query engine.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::clock::Clock;
use crate::proto::Query;

/// Half-open time range `[start, end)` in fractional seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Resolve a query's millisecond bounds; an unset end means "now".
    pub fn from_query(query: &Query, clock: &dyn Clock) -> Self {
        let end_ms = if query.end_timestamp_ms == 0 {
            clock.now_millis()
        } else {
            query.end_timestamp_ms
        };
        Self {
            start: query.start_timestamp_ms as f64 / 1000.0,
            end: end_ms as f64 / 1000.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Intersection with `[start, end)`, or `None` when nothing overlaps.
    pub fn clip(&self, start: f64, end: f64) -> Option<TimeRange> {
        let clipped = TimeRange::new(self.start.max(start), self.end.min(end));
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// A row from a scalar (sum/gauge) tier table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScalarRow {
    #[serde(rename = "MetricName")]
    pub metric_name: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: BTreeMap<String, String>,
    pub ts_ns: i64,
    #[serde(rename = "SumValue")]
    pub value: f64,
}

/// A row from the explicit-bucket histogram table.
///
/// `bucket_counts` holds per-bucket (non-cumulative) counts in ascending bound
/// order; `explicit_bounds` normally has one entry fewer, the last bucket being
/// the implicit `+Inf` bucket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistogramRow {
    #[serde(rename = "MetricName")]
    pub metric_name: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: BTreeMap<String, String>,
    pub ts_ns: i64,
    #[serde(rename = "Sum")]
    pub sum: f64,
    #[serde(rename = "Count")]
    pub count: u64,
    #[serde(rename = "BucketCounts", default)]
    pub bucket_counts: Vec<u64>,
    #[serde(rename = "ExplicitBounds", default)]
    pub explicit_bounds: Vec<f64>,
}

/// Converts a warehouse nanosecond timestamp to protocol milliseconds.
pub(crate) fn nanos_to_millis(nanos: i64) -> i64 {
    nanos / 1_000_000
}
