//! Router configuration for the conversion gateway.
//!
//! # Route Structure
//!
//! ```text
//! /health     - Health check
//! /convert    - Conversion endpoint (GET only; HEAD answers 405)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use video_optimizer::server::routes::{create_router, RouterConfig};
//! use video_optimizer::service::ConversionService;
//!
//! let service = ConversionService::new(transcoder, store, probe);
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{CONTENT_TYPE, RANGE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{convert_handler, convert_head_handler, health_handler, AppState};
use crate::cache::{ObjectStore, SourceProbe};
use crate::service::ConversionService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration that allows any origin and traces requests.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
pub fn create_router<O, P>(service: ConversionService<O, P>, config: RouterConfig) -> Router
where
    O: ObjectStore,
    P: SourceProbe,
{
    let app_state = AppState::new(service);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/convert",
            get(convert_handler::<O, P>).head(convert_head_handler),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, RANGE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
