//! The warehouse collaborator: executes parameterized statements and streams
//! back rows.
//!
//! The query engine only depends on the [`Warehouse`] trait. Rows are handed
//! over as JSON objects keyed by column name, so that decoding into typed rows
//! (and skipping rows that do not decode) happens in the engine rather than in
//! the driver.

mod clickhouse_client;
mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::Result;

pub use self::clickhouse_client::{ClickHouseWarehouse, WarehouseConfig};
pub use self::memory::InMemoryWarehouse;

/// One result row, keyed by column name.
pub type Row = serde_json::Value;

/// Rows of one statement, in warehouse order. An `Err` item ends the stream.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// A positional bind argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlArg {
    Float(f64),
    Text(String),
}

/// Statement text with `?` placeholders and the arguments bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<SqlArg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// Executes statements against the metrics warehouse.
///
/// Implementations must be cancel-safe: dropping the returned future or
/// stream abandons the in-flight statement.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn query(&self, statement: Statement) -> Result<RowStream>;
}
