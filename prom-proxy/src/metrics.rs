//! Prometheus metrics for the remote-read proxy.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::classify::MetricKind;

/// Labels for HTTP request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabelsWithStatus {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

/// HTTP method label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            Method::PUT => HttpMethod::Put,
            Method::DELETE => HttpMethod::Delete,
            Method::PATCH => HttpMethod::Patch,
            Method::HEAD => HttpMethod::Head,
            Method::OPTIONS => HttpMethod::Options,
            _ => HttpMethod::Other,
        }
    }
}

/// Labels for HTTP request latency histogram (without status, since status is unknown at start).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: HttpMethod,
    pub endpoint: String,
}

/// How a remote-read query was answered.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Strategy {
    /// Scalar series read across the retention tiers.
    Tiered,
    /// Histogram-derived series read from the raw histogram table.
    Detail,
}

impl Strategy {
    /// Scalar series go through the tiers; histogram families are read in detail.
    pub fn for_kind(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Scalar => Strategy::Tiered,
            MetricKind::Bucket | MetricKind::Sum | MetricKind::Count => Strategy::Detail,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StrategyLabels {
    pub strategy: Strategy,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of remote-read queries, by dispatch strategy.
    pub remote_read_queries_total: Family<StrategyLabels, Counter>,

    /// Counter of statements sent to the warehouse.
    pub warehouse_statements_total: Counter,

    /// Counter of result rows dropped because they did not decode.
    pub warehouse_rows_skipped_total: Counter,

    /// Counter of HTTP requests.
    pub http_requests_total: Family<HttpLabelsWithStatus, Counter>,

    /// Histogram of HTTP request latency in seconds.
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,

    /// Gauge of currently in-flight requests.
    pub http_requests_in_flight: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let remote_read_queries_total = Family::<StrategyLabels, Counter>::default();
        registry.register(
            "remote_read_queries_total",
            "Total number of remote-read queries answered",
            remote_read_queries_total.clone(),
        );

        let warehouse_statements_total = Counter::default();
        registry.register(
            "warehouse_statements_total",
            "Total number of statements executed against the warehouse",
            warehouse_statements_total.clone(),
        );

        let warehouse_rows_skipped_total = Counter::default();
        registry.register(
            "warehouse_rows_skipped_total",
            "Total number of warehouse rows skipped because they failed to decode",
            warehouse_rows_skipped_total.clone(),
        );

        // HTTP requests total counter
        let http_requests_total = Family::<HttpLabelsWithStatus, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        // HTTP request duration histogram (buckets from 1ms to ~8s)
        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 14))
            });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
            http_request_duration_seconds.clone(),
        );

        // In-flight requests gauge
        let http_requests_in_flight = Gauge::default();
        registry.register(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
            http_requests_in_flight.clone(),
        );

        Self {
            registry,
            remote_read_queries_total,
            warehouse_statements_total,
            warehouse_rows_skipped_total,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
        }
    }

    /// Count one answered query.
    pub fn record_query(&self, strategy: Strategy) {
        self.remote_read_queries_total
            .get_or_create(&StrategyLabels { strategy })
            .inc();
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}
