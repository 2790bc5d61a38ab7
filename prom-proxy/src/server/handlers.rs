//! HTTP route handlers for the proxy.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::codec::{
    CONTENT_ENCODING_SNAPPY, CONTENT_TYPE_PROTOBUF, decode_read_request, encode_read_response,
};
use crate::error::Error;
use crate::metrics::Metrics;
use crate::reader::RemoteReader;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<RemoteReader>,
    pub metrics: Arc<Metrics>,
    /// Deadline for all warehouse work of one request.
    pub query_timeout: Duration,
}

/// Error response wrapper for converting proxy errors to HTTP responses
pub struct ApiError(pub Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_data"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Warehouse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "execution"),
            Error::Encoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = serde_json::json!({
            "status": "error",
            "errorType": error_type,
            "error": self.0.to_string()
        });

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// Handle POST /read and /api/v1/read
///
/// The body is a snappy-compressed `ReadRequest`; the response is a
/// snappy-compressed `ReadResponse` with one result per query.
pub async fn handle_read(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = decode_read_request(&body).inspect_err(|e| {
        tracing::warn!("rejecting remote-read request: {}", e);
    })?;
    tracing::debug!(queries = request.queries.len(), "received remote-read request");

    let response = tokio::time::timeout(state.query_timeout, state.reader.read(&request))
        .await
        .map_err(|_| {
            tracing::error!("remote-read request timed out after {:?}", state.query_timeout);
            Error::Timeout(state.query_timeout)
        })??;

    let body = encode_read_response(&response)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_PROTOBUF),
            (header::CONTENT_ENCODING, CONTENT_ENCODING_SNAPPY),
        ],
        body,
    )
        .into_response())
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle GET /-/healthy
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /-/ready
pub async fn handle_ready() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_input(Error::InvalidInput("bad".into()), StatusCode::BAD_REQUEST)]
    #[case::warehouse(Error::Warehouse("down".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case::timeout(Error::Timeout(Duration::from_secs(30)), StatusCode::GATEWAY_TIMEOUT)]
    #[case::encoding(Error::Encoding("oops".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn should_map_errors_to_status_codes(#[case] error: Error, #[case] expected: StatusCode) {
        // when
        let response = ApiError::from(error).into_response();

        // then
        assert_eq!(response.status(), expected);
    }
}
