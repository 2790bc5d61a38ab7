//! ClickHouse-backed [`Warehouse`] over the HTTP interface.
//!
//! Statements are fetched as `JSONEachRow` so that each output line decodes
//! independently into a [`Row`].

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use clickhouse::Client;
use clickhouse::query::BytesCursor;
use futures::StreamExt;

use super::{Row, RowStream, Statement, Warehouse};
use crate::error::Result;

const ROW_FORMAT: &str = "JSONEachRow";

/// Connection settings for the ClickHouse HTTP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: "http://clickhouse-server:8123".to_string(),
            database: "otel_metrics".to_string(),
            user: "otel_user".to_string(),
            password: "otel_pass".to_string(),
        }
    }
}

/// [`Warehouse`] implementation backed by a pooled ClickHouse HTTP client.
#[derive(Clone)]
pub struct ClickHouseWarehouse {
    client: Client,
}

impl ClickHouseWarehouse {
    pub fn new(config: &WarehouseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password)
            // Keep UInt64/Int64 columns (timestamps, bucket counts) as JSON numbers.
            .with_option("output_format_json_quote_64bit_integers", "0");
        Self { client }
    }

    /// Check that the server is reachable with the configured credentials.
    pub async fn ping(&self) -> Result<()> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    async fn query(&self, statement: Statement) -> Result<RowStream> {
        let mut query = self.client.query(&statement.sql);
        for arg in &statement.args {
            query = query.bind(arg);
        }
        let cursor = query.fetch_bytes(ROW_FORMAT)?;
        Ok(rows(cursor).boxed())
    }
}

type CursorState = (BytesCursor, LineSplitter);

/// Stream the cursor's output one JSON line at a time.
fn rows(cursor: BytesCursor) -> impl futures::Stream<Item = Result<Row>> + Send + 'static {
    futures::stream::try_unfold((cursor, LineSplitter::default()), next_row)
}

async fn next_row((mut cursor, mut lines): CursorState) -> Result<Option<(Row, CursorState)>> {
    loop {
        if let Some(line) = lines.next_line() {
            return Ok(Some((parse_row(&line), (cursor, lines))));
        }
        match cursor.next().await? {
            Some(chunk) => lines.push(&chunk),
            None => {
                return Ok(lines
                    .finish()
                    .map(|line| (parse_row(&line), (cursor, lines))));
            }
        }
    }
}

/// A line that is not valid JSON becomes `Null`, which the engine will
/// refuse to decode and skip.
fn parse_row(line: &[u8]) -> Row {
    serde_json::from_slice(line).unwrap_or_else(|e| {
        tracing::debug!("unparseable row from warehouse: {}", e);
        Row::Null
    })
}

/// Reassembles newline-delimited records from arbitrarily split chunks.
#[derive(Debug, Default)]
struct LineSplitter {
    buffer: BytesMut,
}

impl LineSplitter {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete non-empty line, without its terminator.
    fn next_line(&mut self) -> Option<Bytes> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if !line.is_empty() {
                return Some(line.freeze());
            }
        }
        None
    }

    /// Whatever remains once the input is exhausted.
    fn finish(&mut self) -> Option<Bytes> {
        if let Some(line) = self.next_line() {
            return Some(line);
        }
        let rest = std::mem::take(&mut self.buffer).freeze();
        (!rest.iter().all(u8::is_ascii_whitespace)).then_some(rest)
    }
}
