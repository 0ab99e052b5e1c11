//! HTTP middleware for the functions service.
//!
//! # Layer Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. CORS (answers `OPTIONS` preflight for browser callers)
//!
//! Authentication is not a layer: privileged handlers take the
//! [`AuthenticatedCaller`] extractor so that auth runs before body parsing.

pub mod auth;

use axum::http::{HeaderName, Method, header};
use tower_http::cors::{Any, CorsLayer};

pub use auth::AuthenticatedCaller;

/// CORS policy for browser callers on any origin.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}
