//! Rendition cache over an [`ObjectStore`].
//!
//! Renditions are stored under the hex fingerprint of their request.
//! Population is single-flight: only the holder of a [`PopulationLease`] for a
//! fingerprint runs the transcoder, concurrent requests for the same
//! fingerprint wait for the lease and then look the rendition up again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::fingerprint::Fingerprint;
use super::store::{ByteStream, EntryMetadata, ObjectStore};
use crate::delivery::ByteRange;
use crate::error::StorageError;

type InFlight = Arc<Mutex<HashMap<Fingerprint, Arc<Notify>>>>;

/// A stored rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRendition {
    pub fingerprint: Fingerprint,
    /// Artifact size in bytes
    pub size: u64,
    pub metadata: EntryMetadata,
}

/// Exclusive right to populate one fingerprint.
///
/// Released on drop, which wakes every request waiting for it.
pub struct PopulationLease {
    fingerprint: Fingerprint,
    notify: Arc<Notify>,
    in_flight: InFlight,
}

impl PopulationLease {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl Drop for PopulationLease {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight
            .get(&self.fingerprint)
            .is_some_and(|n| Arc::ptr_eq(n, &self.notify))
        {
            in_flight.remove(&self.fingerprint);
        }
        self.notify.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fingerprint-keyed rendition cache.
pub struct RenditionCache<O: ObjectStore> {
    store: Arc<O>,
    in_flight: InFlight,
}

impl<O: ObjectStore> RenditionCache<O> {
    pub fn new(store: Arc<O>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<O> {
        &self.store
    }

    /// Look up a stored rendition.
    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CachedRendition>, StorageError> {
        let head = self.store.head(&fingerprint.to_hex()).await?;
        Ok(head.map(|head| CachedRendition {
            fingerprint: *fingerprint,
            size: head.size,
            metadata: EntryMetadata::from_map(&head.metadata),
        }))
    }

    /// Stream a stored rendition, or an inclusive byte range of it.
    pub async fn read(
        &self,
        fingerprint: &Fingerprint,
        range: Option<ByteRange>,
    ) -> Result<ByteStream, StorageError> {
        self.store.get(&fingerprint.to_hex(), range).await
    }

    /// Acquire the population lease for `fingerprint`, waiting while another
    /// request holds it.
    ///
    /// Callers should look the rendition up again after acquiring: the
    /// previous holder may have stored it.
    pub async fn lease(&self, fingerprint: Fingerprint) -> PopulationLease {
        loop {
            let notify = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.get(&fingerprint) {
                    Some(notify) => notify.clone(),
                    None => {
                        let notify = Arc::new(Notify::new());
                        in_flight.insert(fingerprint, notify.clone());
                        return PopulationLease {
                            fingerprint,
                            notify,
                            in_flight: self.in_flight.clone(),
                        };
                    }
                }
            };

            // Registered before the re-check, so a release in between is not missed.
            let notified = notify.notified();
            let still_held = lock(&self.in_flight)
                .get(&fingerprint)
                .is_some_and(|n| Arc::ptr_eq(n, &notify));
            if still_held {
                debug!(fingerprint = %fingerprint, "Waiting for in-flight population");
                notified.await;
            }
        }
    }

    /// Store a rendition from a stream, then release the lease.
    ///
    /// Nothing is stored if `body` yields an error.
    pub async fn populate(
        &self,
        lease: PopulationLease,
        body: ByteStream,
        metadata: EntryMetadata,
    ) -> Result<u64, StorageError> {
        let result = self.store_rendition(&lease.fingerprint, body, metadata).await;
        drop(lease);
        result
    }

    /// Store a rendition without holding its lease.
    ///
    /// Used when the lease could not be acquired in time. A concurrent
    /// writer of the same fingerprint produces the same bytes, so the last
    /// put wins harmlessly.
    pub async fn store_rendition(
        &self,
        fingerprint: &Fingerprint,
        body: ByteStream,
        metadata: EntryMetadata,
    ) -> Result<u64, StorageError> {
        let key = fingerprint.to_hex();
        let result = self
            .store
            .put(&key, body, metadata.to_map(), &metadata.mime_type)
            .await;

        match &result {
            Ok(size) => info!(
                fingerprint = %key,
                store = self.store.identifier(),
                bytes = size,
                "Stored rendition"
            ),
            Err(e) => warn!(
                fingerprint = %key,
                store = self.store.identifier(),
                error = %e,
                "Rendition was not stored"
            ),
        }

        result
    }
}

// =============================================================================
// Tests
// =============================================================================
