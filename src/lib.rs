//! # video-optimizer
//!
//! A streaming transcoding gateway. Remote videos are converted on the fly by
//! an external transcoder, streamed to the client while they are produced, and
//! stored in an object store keyed by a fingerprint of the conversion
//! parameters. Repeat requests are served from the store, with byte-range
//! support.
//!
//! ## Architecture
//!
//! - [`request`] - Query parameter normalization
//! - [`transcode`] - Quality mapping, argument compilation and process orchestration
//! - [`cache`] - Fingerprints, object stores and TTL propagation
//! - [`delivery`] - Range parsing and response assembly
//! - [`service`] - The end-to-end conversion flow
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use video_optimizer::{
//!     create_router, ConversionService, HttpSourceProbe, MemoryObjectStore, RouterConfig,
//!     Transcoder,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let probe = HttpSourceProbe::new(Duration::from_secs(5)).unwrap();
//!     let service = ConversionService::new(
//!         Transcoder::new("ffmpeg"),
//!         Arc::new(MemoryObjectStore::new()),
//!         probe,
//!     );
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod delivery;
pub mod error;
pub mod request;
pub mod server;
pub mod service;
pub mod transcode;

// Re-export commonly used types
pub use cache::{
    create_s3_client, derive_expiration, fingerprint, EntryMetadata, Fingerprint,
    HttpSourceProbe, MemoryObjectStore, ObjectStore, RenditionCache, S3ObjectStore, SourceProbe,
};
pub use config::{Config, StorageBackend};
pub use delivery::{parse_range, ByteRange};
pub use error::{
    GatewayError, QueryParameterError, RangeError, ScaleError, StorageError, TranscodeError,
};
pub use request::{normalize, NormalizedRequest, OutputFormat, QueryFields};
pub use server::{create_router, AppState, HealthResponse, RouterConfig};
pub use service::ConversionService;
pub use transcode::{compile, map_quality, CompiledInvocation, TranscodeHandle, Transcoder};
