//! Expiration propagation from the source's `Cache-Control` header.
//!
//! A rendition inherits the freshness of its source: if the source may be
//! cached publicly for N seconds, so may the rendition. Anything else expires
//! immediately.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use tracing::debug;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Derive an absolute expiration time (Unix seconds) from a `Cache-Control` value.
///
/// Returns `now` unless the header contains `public` and a positive
/// `s-maxage` (preferred) or `max-age`. Directive names are case-insensitive
/// and malformed values are ignored.
pub fn derive_expiration(cache_control: Option<&str>, now: u64) -> u64 {
    let Some(header) = cache_control else {
        return now;
    };

    let mut public = false;
    let mut max_age: Option<u64> = None;
    let mut s_maxage: Option<u64> = None;

    for directive in header.split(',') {
        let (name, value) = match directive.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
            None => (directive.trim(), None),
        };
        let seconds = value.and_then(|v| v.parse::<u64>().ok());

        if name.eq_ignore_ascii_case("public") {
            public = true;
        } else if name.eq_ignore_ascii_case("s-maxage") {
            s_maxage = s_maxage.or(seconds);
        } else if name.eq_ignore_ascii_case("max-age") {
            max_age = max_age.or(seconds);
        }
    }

    if !public {
        return now;
    }
    match s_maxage.or(max_age) {
        Some(seconds) if seconds > 0 => now.saturating_add(seconds),
        _ => now,
    }
}

/// Fetches the caching policy of a source.
#[async_trait]
pub trait SourceProbe: Send + Sync + 'static {
    /// The source's `Cache-Control` header, if it could be determined.
    async fn cache_control(&self, source: &str) -> Option<String>;
}

/// Probes sources with an HTTP HEAD request.
#[derive(Clone)]
pub struct HttpSourceProbe {
    client: reqwest::Client,
}

impl HttpSourceProbe {
    /// Create a probe whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceProbe for HttpSourceProbe {
    async fn cache_control(&self, source: &str) -> Option<String> {
        let response = match self.client.head(source).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(source = %source, error = %e, "Source probe failed");
                return None;
            }
        };

        response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}
