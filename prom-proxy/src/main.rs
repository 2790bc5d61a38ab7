use std::sync::Arc;

use clap::Parser;

use prom_proxy::config::{CliArgs, ProxyConfig};
use prom_proxy::server::{AppState, ProxyServer};
use prom_proxy::{ClickHouseWarehouse, Metrics, RemoteReader};

#[tokio::main]
async fn main() {
    // Initialize tracing with configurable log level via RUST_LOG environment variable
    // Default to "info" if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();

    let config = ProxyConfig::from_args(&args).unwrap_or_else(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });
    tracing::info!(
        "Using ClickHouse at {} (database {}), {} retention tier(s), histogram table {}",
        config.warehouse.url,
        config.warehouse.database,
        config.reader.tiers.tiers().len(),
        config.reader.histogram_table
    );

    let warehouse = Arc::new(ClickHouseWarehouse::new(&config.warehouse));
    if let Err(e) = warehouse.ping().await {
        tracing::error!("Failed to reach ClickHouse: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Connected to ClickHouse");

    let metrics = Arc::new(Metrics::new());
    let reader = Arc::new(RemoteReader::new(
        warehouse,
        config.reader,
        metrics.clone(),
    ));
    let state = AppState {
        reader,
        metrics,
        query_timeout: config.query_timeout,
    };

    if let Err(e) = ProxyServer::new(state, config.listen).run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
