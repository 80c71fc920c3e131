//! Test utilities for integration tests.
//!
//! Provides a scripted stand-in for the transcoder that counts its spawns, a
//! static source probe, and helpers for issuing requests through the router.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use video_optimizer::{
    create_router, ConversionService, MemoryObjectStore, ObjectStore, RouterConfig, SourceProbe,
    Transcoder,
};

// =============================================================================
// Source Probe
// =============================================================================

/// A probe that reports the same `Cache-Control` header for every source.
pub struct StaticProbe(pub Option<String>);

#[async_trait]
impl SourceProbe for StaticProbe {
    async fn cache_control(&self, _source: &str) -> Option<String> {
        self.0.clone()
    }
}

// =============================================================================
// Scripted Transcoder
// =============================================================================

/// What the scripted transcoder does after recording its spawn.
pub enum Script {
    /// Write the given bytes to stdout and exit successfully
    Output(&'static str),
    /// Sleep, then write the given bytes
    SlowOutput(&'static str, f32),
    /// Report a missing remote source and fail
    SourceMissing,
    /// Fail with diagnostics that must not reach the client
    Fail,
    /// The first spawn writes its first bytes then stalls; later spawns
    /// write the second output at once
    FirstStalls(&'static str, &'static str),
}

impl Script {
    fn body(&self, counter: &Path) -> String {
        match self {
            Script::Output(output) => format!("printf '%s' '{}'", output),
            Script::SlowOutput(output, secs) => format!("sleep {}; printf '%s' '{}'", secs, output),
            Script::SourceMissing => {
                "echo 'https://example.com/v.mp4: Server returned 404 Not Found' >&2; exit 1"
                    .to_string()
            }
            Script::Fail => "echo 'Invalid data found when processing input' >&2; exit 1".to_string(),
            Script::FirstStalls(first, second) => format!(
                "if [ $(wc -l < '{}') -eq 1 ]; then printf '%s' '{}'; sleep 10; \
                 else printf '%s' '{}'; fi",
                counter.display(),
                first,
                second
            ),
        }
    }
}

// =============================================================================
// Gateway Fixture
// =============================================================================

/// A router wired to a scripted transcoder and an in-memory store.
pub struct TestGateway {
    pub router: Router,
    pub store: Arc<MemoryObjectStore>,
    counter: PathBuf,
    _dir: TempDir,
}

impl TestGateway {
    pub fn new(script: Script) -> Self {
        Self::with_probe(script, None)
    }

    pub fn with_probe(script: Script, cache_control: Option<&str>) -> Self {
        Self::build(script, cache_control, None)
    }

    pub fn with_lease_wait(script: Script, lease_wait: Duration) -> Self {
        Self::build(script, None, Some(lease_wait))
    }

    fn build(script: Script, cache_control: Option<&str>, lease_wait: Option<Duration>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("spawns");
        let command = format!(
            "echo spawn >> '{}'; {}",
            counter.display(),
            script.body(&counter)
        );

        let store = Arc::new(MemoryObjectStore::new());
        let mut service = ConversionService::new(
            Transcoder::with_base_args("sh", ["-c".to_string(), command, "transcoder".to_string()]),
            Arc::clone(&store),
            StaticProbe(cache_control.map(str::to_string)),
        );
        if let Some(lease_wait) = lease_wait {
            service = service.with_lease_wait(lease_wait);
        }
        let router = create_router(service, RouterConfig::new().with_tracing(false));

        Self {
            router,
            store,
            counter,
            _dir: dir,
        }
    }

    /// Number of transcoder processes started so far.
    pub fn spawn_count(&self) -> usize {
        std::fs::read_to_string(&self.counter)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// Issue a request and return as soon as the headers are ready, leaving
    /// the body unread.
    pub async fn start(&self, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn head(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("HEAD")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.get_range(uri, None).await
    }

    pub async fn get_range(&self, uri: &str, range: Option<&str>) -> TestResponse {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header("range", range);
        }
        let request = request.body(Body::empty()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Wait until the rendition stored under `key` is visible.
    pub async fn wait_stored(&self, key: &str) {
        for _ in 0..100 {
            if self.store.head(key).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("rendition {} was never stored", key);
    }
}

/// A fully collected response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

pub const SOURCE: &str = "https%3A%2F%2Fexample.com%2Fv.mp4";

/// `/convert` URI for the test source with extra query parameters.
pub fn convert_uri(extra: &str) -> String {
    if extra.is_empty() {
        format!("/convert?source={}", SOURCE)
    } else {
        format!("/convert?source={}&{}", SOURCE, extra)
    }
}

/// Store key of the rendition produced for `convert_uri(extra)`.
pub fn store_key(extra: &str) -> String {
    let uri = convert_uri(extra);
    let query = uri.trim_start_matches("/convert?");
    let fields = video_optimizer::QueryFields::parse(query);
    let request = video_optimizer::normalize(&fields).unwrap();
    video_optimizer::fingerprint(&request).to_hex()
}
