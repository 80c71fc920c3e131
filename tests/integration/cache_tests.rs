//! Rendition cache integration tests.
//!
//! Tests verify:
//! - Repeat requests are served from the store without a new transcode
//! - Concurrent identical misses share one transcode
//! - A stalled population does not block later identical requests
//! - Stored metadata and Cache-Control propagation
//! - Parameters that change the output get their own rendition

use std::time::Duration;

use axum::http::StatusCode;

use video_optimizer::{EntryMetadata, ObjectStore};

use super::test_utils::{convert_uri, store_key, Script, TestGateway};

// =============================================================================
// Hits and Misses
// =============================================================================

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let gateway = TestGateway::new(Script::Output("artifact"));
    let uri = convert_uri("size=240");

    let first = gateway.get(&uri).await;
    assert_eq!(first.header("x-cache"), Some("miss"));
    gateway.wait_stored(&store_key("size=240")).await;

    let second = gateway.get(&uri).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.header("x-cache"), Some("hit"));
    assert_eq!(second.header("content-type"), Some("video/mp4"));
    assert_eq!(second.header("content-length"), Some("8"));
    assert_eq!(second.header("accept-ranges"), Some("bytes"));
    assert_eq!(second.body, "artifact");

    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_equivalent_queries_share_a_rendition() {
    let gateway = TestGateway::new(Script::Output("artifact"));

    gateway.get(&convert_uri("size=240&format=h264")).await;
    gateway.wait_stored(&store_key("size=240")).await;

    // The default format is implied
    let response = gateway.get(&convert_uri("size=240")).await;
    assert_eq!(response.header("x-cache"), Some("hit"));
    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_different_parameters_are_different_renditions() {
    let gateway = TestGateway::new(Script::Output("artifact"));

    gateway.get(&convert_uri("size=240")).await;
    gateway.wait_stored(&store_key("size=240")).await;

    let response = gateway.get(&convert_uri("size=360")).await;
    assert_eq!(response.header("x-cache"), Some("miss"));
    assert_eq!(gateway.spawn_count(), 2);
}

#[tokio::test]
async fn test_attribution_key_does_not_split_the_cache() {
    let gateway = TestGateway::new(Script::Output("artifact"));

    gateway.get(&convert_uri("key=customer-a")).await;
    gateway.wait_stored(&store_key("")).await;

    let response = gateway.get(&convert_uri("key=customer-b")).await;
    assert_eq!(response.header("x-cache"), Some("hit"));
    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_transcode() {
    let gateway = TestGateway::new(Script::SlowOutput("artifact", 0.3));
    let uri = convert_uri("size=240");

    let (a, b) = tokio::join!(gateway.get(&uri), gateway.get(&uri));

    assert_eq!(a.body, "artifact");
    assert_eq!(b.body, "artifact");
    let mut statuses = vec![
        a.header("x-cache").unwrap().to_string(),
        b.header("x-cache").unwrap().to_string(),
    ];
    statuses.sort();
    assert_eq!(statuses, ["hit", "miss"]);
    assert_eq!(gateway.spawn_count(), 1);
}

#[tokio::test]
async fn test_stalled_leader_does_not_block_followers() {
    let gateway = TestGateway::with_lease_wait(
        Script::FirstStalls("first", "second"),
        Duration::from_millis(200),
    );
    let uri = convert_uri("size=240");

    // Headers arrive with the first bytes; the rest of the output never does
    let leader = gateway.start(&uri).await;
    assert_eq!(leader.status(), StatusCode::OK);

    let follower = tokio::time::timeout(Duration::from_secs(5), gateway.get(&uri))
        .await
        .expect("follower should not wait for the stalled leader");
    assert_eq!(follower.status, StatusCode::OK);
    assert_eq!(follower.header("x-cache"), Some("miss"));
    assert_eq!(follower.body, "second");
    assert_eq!(gateway.spawn_count(), 2);

    drop(leader);
}

// =============================================================================
// Stored Metadata and TTL
// =============================================================================

#[tokio::test]
async fn test_stored_metadata() {
    let gateway = TestGateway::with_probe(Script::Output("artifact"), Some("public, max-age=600"));

    gateway.get(&convert_uri("format=jpg&key=customer-a")).await;
    let key = store_key("format=jpg");
    gateway.wait_stored(&key).await;

    let head = gateway.store.head(&key).await.unwrap().unwrap();
    assert_eq!(head.size, 8);

    let metadata = EntryMetadata::from_map(&head.metadata);
    assert_eq!(metadata.mime_type, "image/jpeg");
    assert_eq!(metadata.original_url, "https://example.com/v.mp4");
    assert_eq!(metadata.attribution_key.as_deref(), Some("customer-a"));
    assert!(metadata.expiration_date >= video_optimizer::cache::unix_now() + 590);
}

#[tokio::test]
async fn test_cache_control_is_forwarded_then_derived() {
    let gateway =
        TestGateway::with_probe(Script::Output("artifact"), Some("public, max-age=600"));
    let uri = convert_uri("");

    let live = gateway.get(&uri).await;
    assert_eq!(live.header("cache-control"), Some("public, max-age=600"));
    gateway.wait_stored(&store_key("")).await;

    let cached = gateway.get(&uri).await;
    assert_eq!(cached.header("x-cache"), Some("hit"));
    let max_age: u64 = cached
        .header("cache-control")
        .and_then(|v| v.strip_prefix("public, max-age="))
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!((590..=600).contains(&max_age));
}

#[tokio::test]
async fn test_private_source_is_not_cacheable_downstream() {
    let gateway =
        TestGateway::with_probe(Script::Output("artifact"), Some("private, max-age=600"));
    let uri = convert_uri("");

    gateway.get(&uri).await;
    gateway.wait_stored(&store_key("")).await;

    let cached = gateway.get(&uri).await;
    assert_eq!(cached.header("x-cache"), Some("hit"));
    assert!(cached.header("cache-control").is_none());
}
