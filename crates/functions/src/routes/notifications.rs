//! Notifications for the signed-in user.
//!
//! Every handler acts on the caller's own notifications only; ids naming
//! somebody else's notification are reported as not found.

use axum::{Json, body::Bytes, extract::State};
use serde::Serialize;
use tracing::instrument;

use insight_library_core::Notification;

use super::{parse_body, users::MessageResponse};
use crate::{
    error::FunctionError, middleware::AuthenticatedCaller,
    services::accounts::NotificationRequest, state::AppState,
};

/// The caller's latest notifications.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// Outcome of marking notifications read.
#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub marked: u64,
}

/// List the caller's 50 most recent notifications, newest first.
///
/// # Errors
///
/// 401 without a valid token.
#[instrument(skip_all)]
pub async fn list_notifications(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<NotificationListResponse>, FunctionError> {
    let feed = state.accounts().notifications(&caller).await?;
    Ok(Json(NotificationListResponse {
        notifications: feed.notifications,
        unread_count: feed.unread_count,
    }))
}

/// Mark notifications read.
///
/// Body: `{ notificationId? }`. Without an id every unread notification is
/// marked.
///
/// # Errors
///
/// 404 when the id does not name one of the caller's notifications.
#[instrument(skip_all)]
pub async fn mark_read(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MarkReadResponse>, FunctionError> {
    let request: NotificationRequest = parse_body(&body)?;
    let marked = state
        .accounts()
        .mark_notifications_read(&caller, request)
        .await?;
    Ok(Json(MarkReadResponse {
        success: true,
        marked,
    }))
}

/// Delete one notification.
///
/// Body: `{ notificationId }`.
///
/// # Errors
///
/// 400 without an id, 404 when it does not name one of the caller's
/// notifications.
#[instrument(skip_all)]
pub async fn delete_notification(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, FunctionError> {
    let request: NotificationRequest = parse_body(&body)?;
    state.accounts().delete_notification(&caller, request).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Notification deleted".to_string(),
    }))
}
