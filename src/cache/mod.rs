//! Rendition cache.
//!
//! Finished renditions are stored in an [`ObjectStore`] under the fingerprint
//! of the request that produced them, together with [`EntryMetadata`].
//!
//! # Components
//!
//! - [`fingerprint`]: SHA-256 identity of a normalized request
//! - [`store`]: object store trait and rendition metadata
//! - [`S3ObjectStore`]: S3 or S3-compatible backend with multipart uploads
//! - [`MemoryObjectStore`]: size-bounded LRU backend
//! - [`RenditionCache`]: lookup, read and single-flight population
//! - [`ttl`]: expiration derived from the source's `Cache-Control`

pub mod fingerprint;
mod memory;
mod rendition;
mod s3;
pub mod store;
pub mod ttl;

pub use fingerprint::{fingerprint, hash_fields, Fingerprint};
pub use memory::{MemoryObjectStore, DEFAULT_MEMORY_STORE_CAPACITY};
pub use rendition::{CachedRendition, PopulationLease, RenditionCache};
pub use s3::{create_s3_client, S3ObjectStore, PART_SIZE};
pub use store::{ByteStream, EntryMetadata, ObjectHead, ObjectStore};
pub use ttl::{derive_expiration, unix_now, HttpSourceProbe, SourceProbe};
