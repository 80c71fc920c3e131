//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                  GET /convert?source=...                        │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (requests, error status) │  │  (router, CORS, tracing)    │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{convert_handler, health_handler, AppState, HealthResponse};
pub use routes::{create_router, RouterConfig};
