//! video-optimizer - A streaming transcoding gateway.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_optimizer::{
    cache::{create_s3_client, HttpSourceProbe, MemoryObjectStore, ObjectStore, S3ObjectStore},
    config::{Config, StorageBackend},
    server::{create_router, RouterConfig},
    service::ConversionService,
    transcode::Transcoder,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("video-optimizer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Transcoder: {}", config.transcoder);
    info!("  Source probe timeout: {}s", config.probe_timeout);
    info!("  Lease wait: {}ms", config.lease_wait);

    match config.storage {
        StorageBackend::S3 => {
            let bucket = config.s3_bucket.clone().unwrap_or_default();
            info!("  Storage: S3 bucket {}", bucket);
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);

            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

            info!("Connecting to S3...");
            if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
                error!("  Failed to reach bucket '{}': {}", bucket, e);
                error!("  Please check your AWS credentials, the bucket name and the endpoint");
                return ExitCode::FAILURE;
            }
            info!("  Connected successfully");

            serve(&config, Arc::new(S3ObjectStore::new(client, bucket))).await
        }
        StorageBackend::Memory => {
            info!(
                "  Storage: memory, {}MB",
                config.memory_cache_size / (1024 * 1024)
            );
            warn!("  Renditions are lost on restart; use --storage s3 in production");

            let store = MemoryObjectStore::with_capacity(config.memory_cache_size);
            serve(&config, Arc::new(store)).await
        }
    }
}

async fn serve<O: ObjectStore>(config: &Config, store: Arc<O>) -> ExitCode {
    let probe = match HttpSourceProbe::new(config.probe_timeout()) {
        Ok(probe) => probe,
        Err(e) => {
            error!("Failed to build the source probe: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = ConversionService::new(Transcoder::new(&config.transcoder), store, probe)
        .with_lease_wait(config.lease_wait());
    let router = create_router(service, build_router_config(config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -o out.mp4 'http://{}/convert?source=<url>&size=640'",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "video_optimizer=debug,tower_http=debug"
    } else {
        "video_optimizer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
