//! The remote-read request orchestrator.

use std::sync::Arc;

use crate::classify::MatcherSet;
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{QueryDispatcher, Rows};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::TimeRange;
use crate::proto::{Query, QueryResult, ReadRequest, ReadResponse};
use crate::reconstruct::{SeriesSet, histogram_series, scalar_series};
use crate::retention::TierTable;
use crate::warehouse::Warehouse;

/// Default cap on rows returned by a single statement.
pub const DEFAULT_MAX_ROWS: u64 = 20_000;

/// Default raw-resolution histogram table.
pub const DEFAULT_HISTOGRAM_TABLE: &str = "otel_metrics.otel_metrics_histogram";

/// Settings that shape the statements sent to the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub tiers: TierTable,
    pub histogram_table: String,
    pub max_rows: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            histogram_table: DEFAULT_HISTOGRAM_TABLE.to_string(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

/// Answers remote-read batches from the warehouse.
///
/// Queries run one after another in request order. The first failure aborts
/// the batch; no partial response is ever produced.
pub struct RemoteReader {
    dispatcher: QueryDispatcher,
    clock: Arc<dyn Clock>,
}

impl RemoteReader {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: ReaderConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            dispatcher: QueryDispatcher::new(
                warehouse,
                config.tiers,
                config.histogram_table,
                config.max_rows,
                metrics,
            ),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock used for retention cutoffs and open-ended queries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn read(&self, request: &ReadRequest) -> Result<ReadResponse> {
        let mut results = Vec::with_capacity(request.queries.len());
        for (i, query) in request.queries.iter().enumerate() {
            let result = self.read_query(query).await.inspect_err(|e| {
                tracing::error!(
                    "remote-read query {} of {} failed: {}",
                    i + 1,
                    request.queries.len(),
                    e
                );
            })?;
            results.push(result);
        }
        Ok(ReadResponse { results })
    }

    async fn read_query(&self, query: &Query) -> Result<QueryResult> {
        let matchers = MatcherSet::from_matchers(&query.matchers);
        let (kind, metric_name) = matchers.classify();
        let range = TimeRange::from_query(query, self.clock.as_ref());
        let now = self.clock.now_secs();

        let rows = self
            .dispatcher
            .dispatch(kind, metric_name, &matchers.attributes, range, now)
            .await?;

        let mut series = SeriesSet::new();
        match &rows {
            Rows::Scalar(rows) => series.extend(rows.iter().map(scalar_series)),
            Rows::Histogram(rows) => {
                let le_filter = matchers.bucket_bound.as_deref();
                for row in rows {
                    series.extend(histogram_series(row, kind, le_filter));
                }
            }
        }
        tracing::debug!(
            kind = kind.as_str(),
            rows = rows.len(),
            series = series.len(),
            "answered remote-read query"
        );

        Ok(QueryResult {
            timeseries: series.into_series(),
        })
    }
}
