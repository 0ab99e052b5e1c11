//! Account management handlers.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use insight_library_core::{AppUser, UserCredentials};

use super::parse_body;
use crate::{
    error::FunctionError,
    middleware::AuthenticatedCaller,
    services::accounts::{
        self, ChangePasswordRequest, CreateUserRequest, DeleteUserRequest, TargetRequest,
        UpdateProfileRequest, UpdateRoleRequest,
    },
    state::AppState,
};

/// Response carrying freshly minted credentials.
#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub success: bool,
    pub message: String,
    /// Only reported for account creation.
    #[serde(rename = "emailSent", skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<bool>,
    pub credentials: UserCredentials,
}

/// Response carrying the updated profile.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: AppUser,
}

/// Response for mutations with nothing to return.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

/// Profiles for the management view.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<AppUser>,
}

/// Query for [`list_users`].
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub pending: bool,
}

fn user_response(user: AppUser) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        user,
    })
}

/// Create a pre-approved account (admin only).
///
/// Body: `{ email, displayName?, role? }`.
///
/// # Errors
///
/// 401/403 for unauthorized callers, 400 for a missing email or a refusal
/// from the identity backend.
#[instrument(skip_all)]
pub async fn invite_user(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CredentialsResponse>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_CREATE)?;
    let request: CreateUserRequest = parse_body(&body)?;
    let account = state.accounts().create_user(&caller, request).await?;

    Ok(Json(CredentialsResponse {
        success: true,
        message: account.message(),
        email_sent: Some(account.email_sent),
        credentials: account.credentials,
    }))
}

/// Reset a user's password to a generated one (admin only).
///
/// Body: `{ userId }`.
///
/// # Errors
///
/// 401/403 for unauthorized callers, 400 without `userId`, 404 for an
/// unknown user.
#[instrument(skip_all)]
pub async fn reset_password(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CredentialsResponse>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_RESET)?;
    let request: TargetRequest = parse_body(&body)?;
    let credentials = state.accounts().reset_password(&caller, request).await?;

    Ok(Json(CredentialsResponse {
        success: true,
        message: "Password reset successfully".to_string(),
        email_sent: None,
        credentials,
    }))
}

/// Change a user's role.
///
/// Body: `{ userId, role }`.
///
/// # Errors
///
/// 403 when the role-change policy refuses, 400/404 for bad input.
#[instrument(skip_all)]
pub async fn update_role(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UserResponse>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_MANAGE)?;
    let request: UpdateRoleRequest = parse_body(&body)?;
    let user = state.accounts().update_role(&caller, request).await?;
    Ok(user_response(user))
}

/// Approve a pending account.
///
/// Body: `{ userId }`.
///
/// # Errors
///
/// 403 unless the caller may manage the target, 404 for an unknown target.
#[instrument(skip_all)]
pub async fn approve_user(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UserResponse>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_MANAGE)?;
    let request: TargetRequest = parse_body(&body)?;
    let user = state.accounts().approve_user(&caller, request).await?;
    Ok(user_response(user))
}

/// Delete an account.
///
/// Body: `{ userId, confirmEmail }`.
///
/// # Errors
///
/// 403 unless the caller may manage the target, 400 when the confirmation
/// does not match.
#[instrument(skip_all)]
pub async fn delete_user(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_MANAGE)?;
    let request: DeleteUserRequest = parse_body(&body)?;
    state.accounts().delete_user(&caller, request).await?;
    Ok(MessageResponse::ok("User deleted successfully"))
}

/// Edit a display name.
///
/// Body: `{ userId?, displayName }`. Without `userId` the caller's own
/// profile is edited.
///
/// # Errors
///
/// 403 when editing a user the caller may not manage.
#[instrument(skip_all)]
pub async fn update_profile(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UserResponse>, FunctionError> {
    let request: UpdateProfileRequest = parse_body(&body)?;
    let user = state.accounts().update_profile(&caller, request).await?;
    Ok(user_response(user))
}

/// Change the caller's own password.
///
/// Body: `{ currentPassword, newPassword }`.
///
/// # Errors
///
/// 400 when the current password is wrong or the new one is too short.
#[instrument(skip_all)]
pub async fn change_password(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, FunctionError> {
    let request: ChangePasswordRequest = parse_body(&body)?;
    state.accounts().change_password(&caller, request).await?;
    Ok(MessageResponse::ok("Password changed successfully"))
}

/// List profiles, newest first (admins and moderators).
///
/// # Errors
///
/// 403 for regular users.
#[instrument(skip_all)]
pub async fn list_users(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> Result<Json<UserListResponse>, FunctionError> {
    let Query(query) = query.map_err(|e| FunctionError::BadRequest(e.body_text()))?;
    let users = state.accounts().list_users(&caller, query.pending).await?;
    Ok(Json(UserListResponse { users }))
}
