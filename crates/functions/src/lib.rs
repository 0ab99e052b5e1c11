//! Insight Library functions library.
//!
//! Privileged account operations for the Insight Library: creating accounts,
//! resetting passwords, changing roles and recording the audit trail. Runs
//! with the identity backend's service credential, which never leaves this
//! process.
//!
//! # Security
//!
//! Every request re-derives the caller from their bearer token and re-reads
//! their role from the profile table. Client-side role checks are a UX
//! convenience only; this service is the boundary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod memory;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use state::AppState;

/// Build the application router with CORS and request tracing.
///
/// Sentry layers are added by the binary so that tests can run without a hub.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(middleware::cors_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
