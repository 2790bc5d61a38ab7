//! In-memory warehouse that answers statements from a scripted responder.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{Row, RowStream, Statement, Warehouse};
use crate::error::{Error, Result};

type Responder = Box<dyn Fn(&Statement) -> Result<Vec<Row>> + Send + Sync>;

/// A [`Warehouse`] for tests and local runs.
///
/// Every executed statement is recorded and answered by a caller-supplied
/// responder, optionally after a delay.
pub struct InMemoryWarehouse {
    responder: Responder,
    delay: Option<Duration>,
    executed: Mutex<Vec<Statement>>,
}

impl InMemoryWarehouse {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Statement) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Answer every statement with the same rows.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self::new(move |_| Ok(rows.clone()))
    }

    /// Fail every statement.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(Error::Warehouse(message.clone())))
    }

    /// Wait `delay` before answering each statement.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Statements executed so far, in execution order.
    pub fn executed(&self) -> Vec<Statement> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn query(&self, statement: Statement) -> Result<RowStream> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(statement.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let rows = (self.responder)(&statement)?;
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}
