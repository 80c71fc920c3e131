//! Range request integration tests.
//!
//! Tests verify:
//! - `bytes=0-` is treated as a whole-resource request
//! - True ranges against live output are buffered and answered with 206
//! - Ranges against cached renditions
//! - Unsatisfiable and malformed ranges yield 416

use axum::http::StatusCode;

use super::test_utils::{convert_uri, store_key, Script, TestGateway};

#[tokio::test]
async fn test_open_range_is_whole_resource() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    let response = gateway.get_range(&convert_uri(""), Some("bytes=0-")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("content-range").is_none());
    assert_eq!(response.body, "0123456789");
}

#[tokio::test]
async fn test_live_range() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    let response = gateway
        .get_range(&convert_uri(""), Some("bytes=2-5"))
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("x-cache"), Some("miss"));
    assert_eq!(response.header("content-range"), Some("bytes 2-5/10"));
    assert_eq!(response.header("content-length"), Some("4"));
    assert_eq!(response.body, "2345");
}

#[tokio::test]
async fn test_live_range_still_populates_cache() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    gateway
        .get_range(&convert_uri(""), Some("bytes=-3"))
        .await;
    gateway.wait_stored(&store_key("")).await;

    let response = gateway.get(&convert_uri("")).await;
    assert_eq!(response.header("x-cache"), Some("hit"));
    assert_eq!(response.body, "0123456789");
}

#[tokio::test]
async fn test_cached_ranges() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    gateway.get(&convert_uri("")).await;
    gateway.wait_stored(&store_key("")).await;

    let response = gateway
        .get_range(&convert_uri(""), Some("bytes=7-"))
        .await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("x-cache"), Some("hit"));
    assert_eq!(response.header("content-range"), Some("bytes 7-9/10"));
    assert_eq!(response.body, "789");

    let response = gateway
        .get_range(&convert_uri(""), Some("bytes=-4"))
        .await;
    assert_eq!(response.header("content-range"), Some("bytes 6-9/10"));
    assert_eq!(response.body, "6789");

    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_range_beyond_end() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    let response = gateway
        .get_range(&convert_uri(""), Some("bytes=5-10"))
        .await;

    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header("content-range"), Some("bytes */10"));
}

#[tokio::test]
async fn test_multiple_ranges_rejected() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    gateway.get(&convert_uri("")).await;
    gateway.wait_stored(&store_key("")).await;

    let response = gateway
        .get_range(&convert_uri(""), Some("bytes=0-1,3-4"))
        .await;
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header("content-range"), Some("bytes */10"));
}

#[tokio::test]
async fn test_malformed_range_rejected() {
    let gateway = TestGateway::new(Script::Output("0123456789"));
    let response = gateway
        .get_range(&convert_uri(""), Some("items=0-1"))
        .await;

    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
}
