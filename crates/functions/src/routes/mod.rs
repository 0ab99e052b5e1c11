//! HTTP route handlers for the functions service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (profile storage reachable)
//!
//! # Account management (bearer token required)
//! POST /functions/v1/invite-user        - Create account, return credentials
//! POST /functions/v1/reset-password     - Overwrite password, return credentials
//! POST /functions/v1/update-role        - Change a user's role
//! POST /functions/v1/approve-user       - Approve a pending account
//! POST /functions/v1/delete-user        - Delete an account
//! POST /functions/v1/update-profile     - Edit a display name
//! POST /functions/v1/change-password    - Change own password
//! GET  /functions/v1/users              - List profiles (?pending=true)
//!
//! # Audit
//! GET  /functions/v1/activity-logs      - Paged audit entries
//!
//! # Notifications (own only)
//! GET  /functions/v1/notifications              - Latest 50 plus unread count
//! POST /functions/v1/mark-notifications-read    - Mark one, or all, read
//! POST /functions/v1/delete-notification        - Delete one
//! ```
//!
//! Handlers take the request body as raw bytes and parse it after the
//! caller has been authenticated and authorized, so a forbidden caller is
//! told 403 even when the body is invalid.

pub mod activity;
pub mod health;
pub mod notifications;
pub mod users;

use axum::{
    Router,
    body::Bytes,
    routing::{get, post},
};
use serde::de::DeserializeOwned;

use crate::error::FunctionError;
use crate::state::AppState;

/// Build the service router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/functions/v1/invite-user", post(users::invite_user))
        .route("/functions/v1/reset-password", post(users::reset_password))
        .route("/functions/v1/update-role", post(users::update_role))
        .route("/functions/v1/approve-user", post(users::approve_user))
        .route("/functions/v1/delete-user", post(users::delete_user))
        .route("/functions/v1/update-profile", post(users::update_profile))
        .route("/functions/v1/change-password", post(users::change_password))
        .route("/functions/v1/users", get(users::list_users))
        .route("/functions/v1/activity-logs", get(activity::list_logs))
        .route("/functions/v1/notifications", get(notifications::list_notifications))
        .route(
            "/functions/v1/mark-notifications-read",
            post(notifications::mark_read),
        )
        .route(
            "/functions/v1/delete-notification",
            post(notifications::delete_notification),
        )
}

/// Parse a JSON request body. An empty body parses as the default value.
///
/// # Errors
///
/// Returns 400 if the body is not valid JSON for `T`.
pub fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, FunctionError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        FunctionError::BadRequest("Invalid JSON body".to_string())
    })
}
