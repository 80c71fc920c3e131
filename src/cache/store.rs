//! Object store abstraction and rendition metadata.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::delivery::ByteRange;
use crate::error::StorageError;

/// A stream of object bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Result of a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Object size in bytes
    pub size: u64,
    /// User metadata as stored
    pub metadata: HashMap<String, String>,
}

/// Storage backend for finished renditions.
///
/// Implementations must make `put` atomic: either the complete object becomes
/// visible, or nothing does.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Look up an object's size and metadata. `Ok(None)` if it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError>;

    /// Stream an object, or an inclusive byte range of it.
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StorageError>;

    /// Store an object from a stream.
    ///
    /// An `Err` item in `body` aborts the upload and nothing is committed.
    /// Returns the number of bytes stored.
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        metadata: HashMap<String, String>,
        content_type: &str,
    ) -> Result<u64, StorageError>;

    /// Human readable name of the backend, for logs.
    fn identifier(&self) -> &str;
}

/// Metadata stored alongside every rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// MIME type of the artifact
    pub mime_type: String,
    /// Source URL the rendition was made from
    pub original_url: String,
    /// Unix time in seconds after which downstream caches should revalidate
    pub expiration_date: u64,
    /// Caller-supplied key, for attribution only
    pub attribution_key: Option<String>,
}

impl EntryMetadata {
    const MIME_TYPE: &'static str = "mimeType";
    const ORIGINAL_URL: &'static str = "originalURL";
    const EXPIRATION_DATE: &'static str = "expirationDate";
    const ATTRIBUTION_KEY: &'static str = "apiKey";

    /// Serialize into store metadata.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::from([
            (Self::MIME_TYPE.to_string(), self.mime_type.clone()),
            (Self::ORIGINAL_URL.to_string(), self.original_url.clone()),
            (
                Self::EXPIRATION_DATE.to_string(),
                self.expiration_date.to_string(),
            ),
        ]);
        if let Some(key) = &self.attribution_key {
            map.insert(Self::ATTRIBUTION_KEY.to_string(), key.clone());
        }
        map
    }

    /// Parse store metadata.
    ///
    /// Keys are matched case-insensitively since S3 lowercases user metadata.
    /// Missing or malformed fields fall back to empty values.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        Self {
            mime_type: field(Self::MIME_TYPE).unwrap_or_default(),
            original_url: field(Self::ORIGINAL_URL).unwrap_or_default(),
            expiration_date: field(Self::EXPIRATION_DATE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            attribution_key: field(Self::ATTRIBUTION_KEY),
        }
    }
}
