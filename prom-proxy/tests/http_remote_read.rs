//! Integration tests for the remote-read HTTP endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use prost::Message;
use serde_json::json;
use tower::ServiceExt;

use prom_proxy::clock::FixedClock;
use prom_proxy::proto::{LabelMatcher, Query, ReadRequest, ReadResponse};
use prom_proxy::server::{AppState, build_router};
use prom_proxy::{InMemoryWarehouse, Metrics, ReaderConfig, RemoteReader};

const NOW_SECS: u64 = 1_760_000_000;
const NOW_MS: i64 = NOW_SECS as i64 * 1000;

fn setup_router(warehouse: InMemoryWarehouse, query_timeout: Duration) -> Router {
    let metrics = Arc::new(Metrics::new());
    let reader = RemoteReader::new(Arc::new(warehouse), ReaderConfig::default(), metrics.clone())
        .with_clock(Arc::new(FixedClock::at_secs(NOW_SECS)));
    build_router(AppState {
        reader: Arc::new(reader),
        metrics,
        query_timeout,
    })
}

fn histogram_warehouse() -> InMemoryWarehouse {
    InMemoryWarehouse::with_rows(vec![json!({
        "MetricName": "task_duration",
        "Attributes": {"service_name": "api"},
        "ts_ns": (NOW_MS - 30_000) * 1_000_000,
        "Sum": 12.5,
        "Count": 6,
        "BucketCounts": [2, 3, 1],
        "ExplicitBounds": [1.0, 5.0]
    })])
}

fn read_request(metric_name: &str) -> Vec<u8> {
    let request = ReadRequest {
        queries: vec![Query {
            start_timestamp_ms: NOW_MS - 3_600_000,
            end_timestamp_ms: NOW_MS,
            matchers: vec![
                LabelMatcher::equal("__name__", metric_name),
                LabelMatcher::equal("service_name", "api"),
            ],
        }],
    };
    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .unwrap()
}

fn decode_read_response(body: &[u8]) -> ReadResponse {
    let raw = snap::raw::Decoder::new().decompress_vec(body).unwrap();
    ReadResponse::decode(raw.as_slice()).unwrap()
}

fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-protobuf")
        .header(header::CONTENT_ENCODING, "snappy")
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn error_body(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn should_answer_histogram_bucket_query() {
    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

    // when
    let response = app
        .oneshot(post("/read", read_request("task_duration_bucket")))
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-protobuf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_ENCODING).unwrap(),
        "snappy"
    );

    let decoded: ReadResponse = decode_read_response(&body_bytes(response).await);
    assert_eq!(decoded.results.len(), 1);
    let buckets: Vec<(String, f64)> = decoded.results[0]
        .timeseries
        .iter()
        .map(|s| (s.label("le").unwrap().to_string(), s.samples[0].value))
        .collect();
    assert_eq!(
        buckets,
        vec![
            ("1".to_string(), 2.0),
            ("5".to_string(), 5.0),
            ("+Inf".to_string(), 6.0),
        ]
    );
    let first = &decoded.results[0].timeseries[0];
    assert_eq!(first.label("__name__"), Some("task_duration_bucket"));
    assert_eq!(first.label("service_name"), Some("api"));
    assert_eq!(first.samples[0].timestamp, NOW_MS - 30_000);
}

#[tokio::test]
async fn should_serve_prometheus_read_path_alias() {
    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

    // when
    let response = app
        .oneshot(post("/api/v1/read", read_request("task_duration_count")))
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::OK);
    let decoded = decode_read_response(&body_bytes(response).await);
    let series = &decoded.results[0].timeseries;
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].label("__name__"), Some("task_duration_count"));
    assert_eq!(series[0].samples[0].value, 6.0);
}

#[tokio::test]
async fn should_reject_body_that_is_not_snappy() {
    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

    // when
    let response = app
        .oneshot(post("/read", b"definitely not snappy".to_vec()))
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["errorType"], "bad_data");
}

#[tokio::test]
async fn should_reject_snappy_body_that_is_not_a_read_request() {
    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));
    let garbage = snap::raw::Encoder::new()
        .compress_vec(&[0xff, 0xff, 0xff, 0xff])
        .unwrap();

    // when
    let response = app.oneshot(post("/read", garbage)).await.unwrap();

    // then
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn should_return_server_error_when_warehouse_fails() {
    // given
    let app = setup_router(
        InMemoryWarehouse::failing("code: 60, table does not exist"),
        Duration::from_secs(30),
    );

    // when
    let response = app
        .oneshot(post("/read", read_request("up")))
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body["errorType"], "execution");
}

#[tokio::test]
async fn should_time_out_slow_warehouse() {
    // given
    let warehouse = InMemoryWarehouse::with_rows(vec![]).with_delay(Duration::from_secs(5));
    let app = setup_router(warehouse, Duration::from_millis(50));

    // when
    let response = app
        .oneshot(post("/read", read_request("up")))
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = error_body(response).await;
    assert_eq!(body["errorType"], "timeout");
}

#[tokio::test]
async fn should_answer_health_and_metrics_endpoints() {
    for uri in ["/-/healthy", "/-/ready"] {
        // given
        let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

        // when
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::OK);
    }

    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

    // when
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("# HELP remote_read_queries_total"));
}

#[tokio::test]
async fn should_reject_get_on_read_endpoint() {
    // given
    let app = setup_router(histogram_warehouse(), Duration::from_secs(30));

    // when
    let response = app
        .oneshot(Request::builder().uri("/read").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // then
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
