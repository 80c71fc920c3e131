//! API integration tests for conversion requests and error handling.
//!
//! Tests verify:
//! - Parameter validation surfaces as 400 with a plain-text message
//! - Live conversion responses and content types per output format
//! - Transcoder failures before the first byte map to 400/500

use axum::http::StatusCode;

use super::test_utils::{convert_uri, store_key, Script, TestGateway};

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Parameter Validation
// =============================================================================

#[tokio::test]
async fn test_missing_source() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get("/convert?size=240").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response
        .header("content-type")
        .unwrap()
        .starts_with("text/plain"));
    assert!(response.text().contains("\"source\""));
    assert_eq!(gateway.spawn_count(), 0);
}

#[tokio::test]
async fn test_missing_query_string() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get("/convert").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("missing"));
}

#[tokio::test]
async fn test_odd_size() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get(&convert_uri("size=241")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("even number"));
    assert_eq!(gateway.spawn_count(), 0);
}

#[tokio::test]
async fn test_unknown_format() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get(&convert_uri("format=gif")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("\"format\""));
}

#[tokio::test]
async fn test_repeated_parameter() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get(&convert_uri("size=240&size=360")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("single value"));
}

#[tokio::test]
async fn test_quality_out_of_range_is_clamped() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get(&convert_uri("quality=150")).await;

    assert_eq!(response.status, StatusCode::OK);
    gateway.wait_stored(&store_key("quality=100")).await;

    let response = gateway.get(&convert_uri("quality=100")).await;
    assert_eq!(response.header("x-cache"), Some("hit"));
    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_fractional_keyframe() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.get(&convert_uri("keyframe=2.5")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("\"keyframe\""));
    assert_eq!(gateway.spawn_count(), 0);
}

// =============================================================================
// Live Conversion
// =============================================================================

#[tokio::test]
async fn test_video_conversion() {
    let gateway = TestGateway::new(Script::Output("mp4-bytes"));
    let response = gateway.get(&convert_uri("size=240")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("video/mp4"));
    assert_eq!(response.header("x-cache"), Some("miss"));
    assert_eq!(response.body, "mp4-bytes");
    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_jpg_conversion() {
    let gateway = TestGateway::new(Script::Output("jpeg-bytes"));
    let response = gateway.get(&convert_uri("format=jpg")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert_eq!(response.body, "jpeg-bytes");
}

#[tokio::test]
async fn test_av1_conversion() {
    let gateway = TestGateway::new(Script::Output("av1-bytes"));
    let response = gateway.get(&convert_uri("format=av1&quality=50")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("video/mp4"));
}

#[tokio::test]
async fn test_head_does_not_convert() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let response = gateway.head(&convert_uri("size=240")).await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("GET"));
    assert!(response.body.is_empty());
    assert_eq!(gateway.spawn_count(), 0);
    assert!(gateway.store.is_empty().await);
}

// =============================================================================
// Transcoder Failures
// =============================================================================

#[tokio::test]
async fn test_source_not_found() {
    let gateway = TestGateway::new(Script::SourceMissing);
    let response = gateway.get(&convert_uri("")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text(),
        "The URL you passed as source could not be accessed."
    );
}

#[tokio::test]
async fn test_transcoder_failure_hides_diagnostics() {
    let gateway = TestGateway::new(Script::Fail);
    let response = gateway.get(&convert_uri("")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text(), "Could not convert video.");
    assert!(!response.text().contains("Invalid data"));
}

#[tokio::test]
async fn test_failed_conversion_is_not_cached() {
    let gateway = TestGateway::new(Script::Fail);

    gateway.get(&convert_uri("")).await;
    let response = gateway.get(&convert_uri("")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(gateway.spawn_count(), 2);
    assert!(gateway.store.is_empty().await);
}
