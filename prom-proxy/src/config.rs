//! Command-line, environment and file configuration for the proxy.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::reader::{DEFAULT_HISTOGRAM_TABLE, ReaderConfig};
use crate::retention::{RetentionTier, TierTable};
use crate::warehouse::WarehouseConfig;

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "prom-proxy")]
#[command(about = "Prometheus remote-read adapter for OpenTelemetry metrics in ClickHouse")]
pub struct CliArgs {
    /// Path to a YAML file overriding the histogram table and retention tiers
    #[arg(short, long, env = "PROXY_CONFIG_FILE")]
    pub config: Option<String>,

    /// ClickHouse HTTP endpoint
    #[arg(long, default_value = "http://clickhouse-server:8123", env = "CLICKHOUSE_URL")]
    pub clickhouse_url: String,

    #[arg(long, default_value = "otel_metrics", env = "CLICKHOUSE_DB")]
    pub clickhouse_db: String,

    #[arg(long, default_value = "otel_user", env = "CLICKHOUSE_USER")]
    pub clickhouse_user: String,

    #[arg(long, default_value = "otel_pass", env = "CLICKHOUSE_PASS")]
    pub clickhouse_pass: String,

    /// Address to listen on, e.g. ":9364" or "127.0.0.1:9364"
    #[arg(short, long, default_value = ":9364", env = "PROXY_LISTEN")]
    pub listen: String,

    /// Deadline for all warehouse work of one request, e.g. "30s"
    #[arg(long, default_value = "30s", env = "QUERY_TIMEOUT")]
    pub query_timeout: String,

    /// Maximum rows returned by a single statement
    #[arg(long, default_value = "20000", env = "MAX_ROWS")]
    pub max_rows: u64,
}

/// Optional file-based overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub histogram_table: Option<String>,
    #[serde(default)]
    pub tiers: Option<Vec<TierConfig>>,
}

/// One retention tier as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_value_column")]
    pub value_column: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    pub retention: String,
}

fn default_value_column() -> String {
    "SumValue".to_string()
}

fn default_resolution() -> String {
    "0s".to_string()
}

impl TierConfig {
    fn to_tier(&self) -> Result<RetentionTier> {
        Ok(RetentionTier::new(
            self.name.clone(),
            self.table.clone(),
            self.value_column.clone(),
            parse_duration(&self.resolution)?,
            parse_duration(&self.retention)?,
        ))
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    pub query_timeout: Duration,
    pub warehouse: WarehouseConfig,
    pub reader: ReaderConfig,
}

impl ProxyConfig {
    /// Resolve CLI/environment settings, applying the config file if one is given.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => {
                let file = load_config(path)?;
                tracing::info!("Loaded configuration from {}", path);
                file
            }
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: &CliArgs, file: FileConfig) -> Result<Self> {
        if args.max_rows == 0 {
            return Err(Error::Config("max rows must be positive".into()));
        }
        let query_timeout = parse_duration(&args.query_timeout)?;
        if query_timeout.is_zero() {
            return Err(Error::Config("query timeout must be positive".into()));
        }

        let tiers = match file.tiers {
            Some(tiers) => TierTable::new(
                tiers
                    .iter()
                    .map(TierConfig::to_tier)
                    .collect::<Result<Vec<_>>>()?,
            )?,
            None => TierTable::default(),
        };

        Ok(Self {
            listen: parse_listen_addr(&args.listen)?,
            query_timeout,
            warehouse: WarehouseConfig {
                url: args.clickhouse_url.clone(),
                database: args.clickhouse_db.clone(),
                user: args.clickhouse_user.clone(),
                password: args.clickhouse_pass.clone(),
            },
            reader: ReaderConfig {
                tiers,
                histogram_table: file
                    .histogram_table
                    .unwrap_or_else(|| DEFAULT_HISTOGRAM_TABLE.to_string()),
                max_rows: args.max_rows,
            },
        })
    }
}

/// Load file overrides from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

    serde_yaml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
}

/// Parse a Prometheus-style duration string (e.g., "15s", "1m", "2h").
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("Empty duration string".into()));
    }

    // Find where the numeric part ends
    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    if num_end == 0 {
        return Err(Error::Config(format!(
            "Duration must start with a number: {}",
            s
        )));
    }

    let value: f64 = s[..num_end]
        .parse()
        .map_err(|_| Error::Config(format!("Invalid duration number: {}", s)))?;
    let unit = &s[num_end..];

    let multiplier = match unit {
        "ms" => 0.001,
        "s" | "" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86400.0,
        "w" => 7.0 * 86400.0,
        _ => {
            return Err(Error::Config(format!("Unknown duration unit: {}", unit)));
        }
    };

    Duration::try_from_secs_f64(value * multiplier)
        .map_err(|e| Error::Config(format!("Duration out of range '{}': {}", s, e)))
}

/// Parse a listen address. A bare `:port` listens on all interfaces.
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr> {
    let s = s.trim();
    let addr = match s.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => s.to_string(),
    };
    addr.parse()
        .map_err(|e| Error::Config(format!("Invalid listen address '{}': {}", s, e)))
}
