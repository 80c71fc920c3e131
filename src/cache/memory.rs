//! In-process object store.
//!
//! Keeps renditions in an LRU map bounded by total byte size. Useful for local
//! development and tests, where an S3 bucket is not available. Contents are
//! lost on restart.
//!
//! # Size-Based Eviction
//!
//! The store tracks the total size of stored objects in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. An object larger
//! than the whole capacity is evicted right after it is stored.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use lru::LruCache;
use tokio::sync::RwLock;

use super::store::{ByteStream, ObjectHead, ObjectStore};
use crate::delivery::ByteRange;
use crate::error::StorageError;

/// Default capacity: 256MB
pub const DEFAULT_MEMORY_STORE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: HashMap<String, String>,
}

/// LRU object store with size-based capacity.
pub struct MemoryObjectStore {
    objects: RwLock<LruCache<String, StoredObject>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl MemoryObjectStore {
    /// Create a store with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_STORE_CAPACITY)
    }

    /// Create a store with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            objects: RwLock::new(LruCache::new(max_entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Current total size of stored objects in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    async fn insert(&self, key: String, object: StoredObject) {
        let data_size = object.data.len();
        let mut objects = self.objects.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = objects.peek(&key) {
            *current_size = current_size.saturating_sub(old.data.len());
        }

        // A full entry count evicts on its own; keep the byte count in step.
        if let Some((evicted_key, evicted)) = objects.push(key, object) {
            if objects.peek(&evicted_key).is_none() {
                *current_size = current_size.saturating_sub(evicted.data.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match objects.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects.peek(key).map(|object| ObjectHead {
            size: object.data.len() as u64,
            metadata: object.metadata.clone(),
        }))
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StorageError> {
        let data = {
            let mut objects = self.objects.write().await;
            objects
                .get(key)
                .map(|object| object.data.clone())
                .ok_or_else(|| StorageError::NotFound(format!("memory://{}", key)))?
        };

        let data = match range {
            Some(range) if !data.is_empty() => {
                let last = data.len() - 1;
                let start = (range.start as usize).min(data.len());
                let end = (range.end as usize).min(last);
                if start > end {
                    Bytes::new()
                } else {
                    data.slice(start..=end)
                }
            }
            _ => data,
        };

        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        metadata: HashMap<String, String>,
        _content_type: &str,
    ) -> Result<u64, StorageError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::Aborted(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }

        let data = buffer.freeze();
        let size = data.len() as u64;
        self.insert(key.to_string(), StoredObject { data, metadata })
            .await;
        Ok(size)
    }

    fn identifier(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
