//! prom-proxy - A Prometheus remote-read adapter for OpenTelemetry metrics
//! stored in ClickHouse.
//!
//! The proxy accepts remote-read batches, translates each query into
//! parameterized SQL against the OpenTelemetry exporter's tables and rebuilds
//! Prometheus time series from the result rows.
//!
//! # Architecture
//!
//! Each query flows through the same stages:
//!
//! - **Classification**: equality matchers are collected and the `__name__`
//!   value is checked for a histogram suffix (`_bucket`, `_sum`, `_count`).
//! - **Dispatch**: plain metrics are read across the retention tiers (raw
//!   points, then 1m, 5m and 1h rollups), each instant from exactly one tier.
//!   Histogram families are read from the raw histogram table.
//! - **Reconstruction**: rows become series. A histogram row expands into
//!   cumulative `le` buckets plus `_sum` and `_count`.
//!
//! The warehouse is reached through the [`Warehouse`] trait, so the whole
//! pipeline runs against [`InMemoryWarehouse`] in tests.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use prom_proxy::{ClickHouseWarehouse, Metrics, ReaderConfig, RemoteReader, WarehouseConfig};
//!
//! let warehouse = Arc::new(ClickHouseWarehouse::new(&WarehouseConfig::default()));
//! let reader = RemoteReader::new(warehouse, ReaderConfig::default(), Arc::new(Metrics::new()));
//! let response = reader.read(&request).await?;
//! ```

mod classify;
pub mod clock;
pub mod codec;
pub mod config;
mod dispatch;
mod error;
mod metrics;
mod model;
mod predicate;
pub mod proto;
mod reader;
mod reconstruct;
mod retention;
pub mod server;
pub mod warehouse;

pub use classify::{MatcherSet, MetricKind, classify};
pub use dispatch::{QueryDispatcher, Rows, build_detail_statement, build_tiered_statement};
pub use error::{Error, Result};
pub use metrics::{Metrics, Strategy};
pub use model::{HistogramRow, ScalarRow, TimeRange};
pub use predicate::{Predicate, build_predicate, escape_attribute_name};
pub use reader::{DEFAULT_HISTOGRAM_TABLE, DEFAULT_MAX_ROWS, ReaderConfig, RemoteReader};
pub use reconstruct::{SeriesSet, format_bound, histogram_series, scalar_series};
pub use retention::{RetentionTier, Segment, TierTable};
pub use warehouse::{
    ClickHouseWarehouse, InMemoryWarehouse, Row, RowStream, SqlArg, Statement, Warehouse,
    WarehouseConfig,
};
