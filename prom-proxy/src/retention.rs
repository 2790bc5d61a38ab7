//! Retention tiers and the segment planner.
//!
//! Metrics are kept at several resolutions, each in its own table with its own
//! retention window: raw points for a few hours, then progressively coarser
//! rollups for longer. A query range is split so that every instant is read
//! from exactly one tier, the finest one still retaining it.
//!
//! For tier `i` (finest first) the covered window is
//! `[now - retention_i, upper_i)` where `upper_0 = now` and
//! `upper_i = now - retention_{i-1}`. Windows are contiguous and disjoint, so
//! clipping each one to the query range partitions
//! `[start, end) ∩ [now - retention_last, now)` exactly once.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::TimeRange;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// A fixed-resolution backing table and the span of history it retains.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionTier {
    pub name: String,
    pub table: String,
    /// Column holding the point value in this table.
    pub value_column: String,
    /// Rollup interval; zero for raw points.
    pub resolution: Duration,
    pub retention: Duration,
}

impl RetentionTier {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        value_column: impl Into<String>,
        resolution: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            value_column: value_column.into(),
            resolution,
            retention,
        }
    }
}

/// The part of a query range served by one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    pub tier: &'a RetentionTier,
    pub range: TimeRange,
}

/// Ordered tiers, finest resolution and shortest retention first.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<RetentionTier>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                RetentionTier::new(
                    "raw",
                    "otel_metrics.otel_metrics_sum",
                    "Value",
                    Duration::ZERO,
                    Duration::from_secs(3 * HOUR),
                ),
                RetentionTier::new(
                    "1m",
                    "otel_metrics.otel_metrics_sum_1m",
                    "SumValue",
                    Duration::from_secs(60),
                    Duration::from_secs(15 * DAY),
                ),
                RetentionTier::new(
                    "5m",
                    "otel_metrics.otel_metrics_sum_5m",
                    "SumValue",
                    Duration::from_secs(300),
                    Duration::from_secs(63 * DAY),
                ),
                RetentionTier::new(
                    "1h",
                    "otel_metrics.otel_metrics_sum_1h",
                    "SumValue",
                    Duration::from_secs(HOUR),
                    Duration::from_secs(455 * DAY),
                ),
            ],
        }
    }
}

impl TierTable {
    /// Build a tier table, checking that retention strictly grows from one
    /// tier to the next and that table and column names are plain identifiers.
    pub fn new(tiers: Vec<RetentionTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::Config("at least one retention tier is required".into()));
        }
        let mut tables = HashSet::new();
        for tier in &tiers {
            for identifier in [&tier.table, &tier.value_column] {
                if !is_identifier(identifier) {
                    return Err(Error::Config(format!(
                        "tier '{}': '{}' is not a valid identifier",
                        tier.name, identifier
                    )));
                }
            }
            if !tables.insert(tier.table.as_str()) {
                return Err(Error::Config(format!(
                    "table '{}' is used by more than one tier",
                    tier.table
                )));
            }
        }
        for pair in tiers.windows(2) {
            if pair[1].retention <= pair[0].retention {
                return Err(Error::Config(format!(
                    "tier '{}' must retain longer than tier '{}'",
                    pair[1].name, pair[0].name
                )));
            }
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[RetentionTier] {
        &self.tiers
    }

    /// The finest tier.
    pub fn raw(&self) -> &RetentionTier {
        &self.tiers[0]
    }

    /// Instant before which no tier retains data.
    #[cfg(test)]
    fn horizon(&self, now: f64) -> f64 {
        let longest = self.tiers.last().map_or(Duration::ZERO, |t| t.retention);
        now - longest.as_secs_f64()
    }

    /// Split `range` into per-tier segments, finest tier (newest data) first.
    ///
    /// Returns no segments when the range is empty or lies entirely outside
    /// `[horizon, now)`.
    pub fn plan(&self, range: TimeRange, now: f64) -> Vec<Segment<'_>> {
        let mut segments = Vec::with_capacity(self.tiers.len());
        let mut upper = now;
        for tier in &self.tiers {
            let lower = now - tier.retention.as_secs_f64();
            if let Some(clipped) = range.clip(lower, upper) {
                segments.push(Segment {
                    tier,
                    range: clipped,
                });
            }
            upper = lower;
        }
        segments
    }
}

/// `[A-Za-z0-9_]` segments joined by single dots, e.g. `db.table`.
fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
