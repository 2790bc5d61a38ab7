//! Error types for the remote-read proxy.

use std::time::Duration;

use thiserror::Error;

/// Error type for remote-read operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request body or one of its parameters could not be understood.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The warehouse rejected a statement or the connection failed.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// The per-request deadline elapsed before all queries completed.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be serialized.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Startup configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<clickhouse::error::Error> for Error {
    fn from(err: clickhouse::error::Error) -> Self {
        Error::Warehouse(err.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::InvalidInput(format!("failed proto unmarshal: {}", err))
    }
}

impl From<prost::EncodeError> for Error {
    fn from(err: prost::EncodeError) -> Self {
        Error::Encoding(format!("failed proto marshal: {}", err))
    }
}

/// Result type alias for remote-read operations.
pub type Result<T> = std::result::Result<T, Error>;
