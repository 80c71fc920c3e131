//! Configuration management.
//!
//! Settings come from command-line arguments, then from environment variables
//! with the `VO_` prefix, then from the defaults below.
//!
//! # Environment Variables
//!
//! - `VO_HOST` - Server bind address (default: 0.0.0.0)
//! - `VO_PORT` - Server port (default: 3000)
//! - `VO_STORAGE` - Rendition store, `s3` or `memory` (default: s3)
//! - `VO_S3_BUCKET` - S3 bucket for renditions (required with `s3`)
//! - `VO_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `VO_S3_REGION` - AWS region (default: us-east-1)
//! - `VO_MEMORY_CACHE_SIZE` - Byte budget of the memory store (default: 256 MiB)
//! - `VO_TRANSCODER` - Transcoder program (default: ffmpeg)
//! - `VO_PROBE_TIMEOUT` - Source header probe timeout in seconds (default: 5)
//! - `VO_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::cache::DEFAULT_MEMORY_STORE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default transcoder program.
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";

/// Default source probe timeout in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default wait for an in-flight identical conversion, in milliseconds.
pub const DEFAULT_LEASE_WAIT_MS: u64 = 5000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Where finished renditions are stored.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3 or an S3-compatible service
    S3,
    /// Size-bounded in-process LRU, lost on restart
    Memory,
}

/// video-optimizer - A streaming transcoding gateway.
///
/// Converts remote videos on the fly and caches every rendition, keyed by a
/// fingerprint of its conversion parameters.
#[derive(Parser, Debug, Clone)]
#[command(name = "video-optimizer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "VO_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "VO_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Rendition store backend.
    #[arg(long, value_enum, default_value_t = StorageBackend::S3, env = "VO_STORAGE")]
    pub storage: StorageBackend,

    /// S3 bucket that holds the renditions.
    #[arg(long, env = "VO_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "VO_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "VO_S3_REGION")]
    pub s3_region: String,

    /// Byte budget of the in-memory store.
    #[arg(long, default_value_t = DEFAULT_MEMORY_STORE_CAPACITY, env = "VO_MEMORY_CACHE_SIZE")]
    pub memory_cache_size: usize,

    // =========================================================================
    // Conversion Configuration
    // =========================================================================
    /// Transcoder program, looked up on PATH unless absolute.
    #[arg(long, default_value = DEFAULT_TRANSCODER, env = "VO_TRANSCODER")]
    pub transcoder: String,

    /// Timeout in seconds for the HEAD request that fetches the source's
    /// Cache-Control header.
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS, env = "VO_PROBE_TIMEOUT")]
    pub probe_timeout: u64,

    /// Milliseconds a cache miss waits for an identical conversion already in
    /// flight before converting on its own.
    #[arg(long, default_value_t = DEFAULT_LEASE_WAIT_MS, env = "VO_LEASE_WAIT")]
    pub lease_wait: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "VO_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage == StorageBackend::S3
            && !self.s3_bucket.as_deref().is_some_and(|b| !b.is_empty())
        {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or VO_S3_BUCKET, \
                 or use --storage memory"
                    .to_string(),
            );
        }

        if self.memory_cache_size == 0 {
            return Err("memory_cache_size must be greater than 0".to_string());
        }

        if self.probe_timeout == 0 {
            return Err("probe_timeout must be greater than 0".to_string());
        }

        if self.transcoder.trim().is_empty() {
            return Err("transcoder must not be empty".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn lease_wait(&self) -> Duration {
        Duration::from_millis(self.lease_wait)
    }
}

// =============================================================================
// Tests
// =============================================================================
