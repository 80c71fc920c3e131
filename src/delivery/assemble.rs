//! HTTP response assembly for live and cached renditions.
//!
//! Live output has no known length until the transcoder finishes, so a true
//! range request against it buffers the whole artifact first. Cached
//! renditions have a known size and are sliced by the store.

use std::io;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use super::range::{is_whole_resource, parse_range};
use crate::cache::{CachedRendition, ObjectStore, RenditionCache};
use crate::error::{GatewayError, TranscodeError};

/// Reports whether a response was served from the rendition cache.
pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Cache status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn header_value(&self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("hit"),
            CacheStatus::Miss => HeaderValue::from_static("miss"),
        }
    }
}

fn base_headers(mime_type: &str, cache: CacheStatus) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(X_CACHE.clone(), cache.header_value());
    headers
}

fn set_cache_control(headers: &mut HeaderMap, value: Option<&str>) {
    if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

/// Respond with live transcoder output.
///
/// Whole-resource requests are streamed as they are produced. Any other
/// `Range` buffers the complete output and answers 206, or fails with
/// [`GatewayError::Range`] if the range cannot be satisfied.
pub async fn live_response<S>(
    output: S,
    mime_type: &str,
    cache_control: Option<&str>,
    range_header: Option<&str>,
) -> Result<Response, GatewayError>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let mut headers = base_headers(mime_type, CacheStatus::Miss);
    set_cache_control(&mut headers, cache_control);

    let range_header = match range_header {
        Some(value) if !is_whole_resource(Some(value)) => value,
        _ => return Ok((StatusCode::OK, headers, Body::from_stream(output)).into_response()),
    };

    let artifact = buffer(output).await?;
    let length = artifact.len() as u64;
    let range = parse_range(range_header, length).map_err(|e| GatewayError::range(e, length))?;

    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.size()));
    if let Ok(value) = HeaderValue::from_str(&range.content_range(length)) {
        headers.insert(header::CONTENT_RANGE, value);
    }

    let slice = artifact.slice(range.start as usize..=range.end as usize);
    Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from(slice)).into_response())
}

/// Respond with a stored rendition.
///
/// `now` is the current Unix time, used to turn the stored expiration into a
/// relative `max-age`.
pub async fn cached_response<O: ObjectStore>(
    cache: &RenditionCache<O>,
    rendition: &CachedRendition,
    range_header: Option<&str>,
    now: u64,
) -> Result<Response, GatewayError> {
    let mime_type = if rendition.metadata.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        rendition.metadata.mime_type.as_str()
    };
    let mut headers = base_headers(mime_type, CacheStatus::Hit);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let remaining = rendition.metadata.expiration_date.saturating_sub(now);
    if remaining > 0 {
        set_cache_control(&mut headers, Some(&format!("public, max-age={}", remaining)));
    }

    if is_whole_resource(range_header) {
        let body = cache.read(&rendition.fingerprint, None).await?;
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rendition.size));
        return Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response());
    }

    let range_header = range_header.unwrap_or_default();
    let range = parse_range(range_header, rendition.size)
        .map_err(|e| GatewayError::range(e, rendition.size))?;
    let body = cache.read(&rendition.fingerprint, Some(range)).await?;

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.size()));
    if let Ok(value) = HeaderValue::from_str(&range.content_range(rendition.size)) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from_stream(body)).into_response())
}

/// Collect a stream into memory, failing on the first error item.
async fn buffer<S>(mut output: S) -> Result<Bytes, GatewayError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut artifact = BytesMut::new();
    while let Some(chunk) = output.next().await {
        let chunk = chunk.map_err(|e| TranscodeError::Io(e.to_string()))?;
        artifact.extend_from_slice(&chunk);
    }
    Ok(artifact.freeze())
}
