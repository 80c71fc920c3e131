//! Conversion service: the end-to-end request flow.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ConversionService                          │
//! │  convert()                                                        │
//! │  1. Normalize query    4. On miss: lease, transcode ∥ probe       │
//! │  2. Compile arguments  5. Tee output to client and uploader       │
//! │  3. Look up cache      6. Assemble response (200 / 206 / 416)     │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//!  ┌────────────────┐   ┌─────────────┐      ┌──────────────┐
//!  │ RenditionCache │   │ Transcoder  │      │ SourceProbe  │
//!  └────────────────┘   └─────────────┘      └──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use tracing::{debug, error, info, warn};

use crate::cache::{
    derive_expiration, fingerprint, unix_now, EntryMetadata, Fingerprint, ObjectStore,
    RenditionCache, SourceProbe,
};
use crate::delivery::{cached_response, live_response, tee};
use crate::error::GatewayError;
use crate::request::{attribution_key, normalize, QueryFields};
use crate::transcode::{compile, AsyncErrorCallback, Transcoder};

/// How long a miss waits for another request populating the same rendition
/// before converting on its own.
pub const DEFAULT_LEASE_WAIT: Duration = Duration::from_secs(5);

/// Service for converting, caching and delivering renditions.
///
/// # Type Parameters
///
/// * `O` - The object store holding finished renditions
/// * `P` - The probe used to fetch the source's caching policy
pub struct ConversionService<O: ObjectStore, P: SourceProbe> {
    transcoder: Transcoder,
    cache: Arc<RenditionCache<O>>,
    probe: Arc<P>,
    lease_wait: Duration,
}

impl<O: ObjectStore, P: SourceProbe> ConversionService<O, P> {
    pub fn new(transcoder: Transcoder, store: Arc<O>, probe: P) -> Self {
        Self {
            transcoder,
            cache: Arc::new(RenditionCache::new(store)),
            probe: Arc::new(probe),
            lease_wait: DEFAULT_LEASE_WAIT,
        }
    }

    /// Bound the wait for an in-flight population of the same rendition.
    pub fn with_lease_wait(mut self, lease_wait: Duration) -> Self {
        self.lease_wait = lease_wait;
        self
    }

    pub fn cache(&self) -> &Arc<RenditionCache<O>> {
        &self.cache
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Serve a conversion request.
    ///
    /// `query` is the raw query string, `range_header` the request's `Range`
    /// header if any. Errors are returned only while the response can still
    /// carry an error status.
    pub async fn convert(
        &self,
        query: &str,
        range_header: Option<&str>,
    ) -> Result<Response, GatewayError> {
        let fields = QueryFields::parse(query);
        let request = normalize(&fields)?;
        let key = attribution_key(&fields)?;
        let invocation = compile(&request)?;
        let fp = fingerprint(&request);

        if let Some(response) = self.serve_cached(&fp, range_header).await? {
            return Ok(response);
        }

        // The leader's upload is paced by its client, so the wait is bounded.
        let lease = match tokio::time::timeout(self.lease_wait, self.cache.lease(fp)).await {
            Ok(lease) => Some(lease),
            Err(_) => {
                warn!(
                    fingerprint = %fp,
                    waited_ms = self.lease_wait.as_millis() as u64,
                    "Population still in flight, converting independently"
                );
                None
            }
        };

        // The previous lease holder may have stored the rendition meanwhile.
        if let Some(response) = self.serve_cached(&fp, range_header).await? {
            return Ok(response);
        }

        info!(fingerprint = %fp, source = %request.source, "Cache miss, converting");

        let source = request.source.clone();
        let on_async_error: AsyncErrorCallback = Box::new(move |e| {
            error!(source = %source, error = %e, "Conversion failed after streaming started");
        });

        let (handle, cache_control) = tokio::join!(
            self.transcoder.invoke(&invocation, on_async_error),
            self.probe.cache_control(&request.source),
        );
        let handle = handle?;

        let mime_type = invocation.file_type.mime_type();
        let metadata = EntryMetadata {
            mime_type: mime_type.to_string(),
            original_url: request.source.clone(),
            expiration_date: derive_expiration(cache_control.as_deref(), unix_now()),
            attribution_key: key,
        };

        let (client, upload) = tee(handle.stream, handle.outcome.clone());
        let cache = self.cache.clone();
        tokio::spawn(async move {
            // Failures are logged by the cache; the client response is unaffected.
            let _ = match lease {
                Some(lease) => cache.populate(lease, upload, metadata).await,
                None => cache.store_rendition(&fp, upload, metadata).await,
            };
        });

        live_response(client, mime_type, cache_control.as_deref(), range_header).await
    }

    async fn serve_cached(
        &self,
        fp: &Fingerprint,
        range_header: Option<&str>,
    ) -> Result<Option<Response>, GatewayError> {
        let Some(rendition) = self.cache.lookup(fp).await? else {
            return Ok(None);
        };
        debug!(fingerprint = %fp, size = rendition.size, "Cache hit");
        let response = cached_response(&self.cache, &rendition, range_header, unix_now()).await?;
        Ok(Some(response))
    }
}
