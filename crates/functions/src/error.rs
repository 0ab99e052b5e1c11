//! Unified error handling for the functions service.
//!
//! Every failure is returned as `{"error": "<message>"}` with the status code
//! below. Server-side failures are captured by Sentry and reported to the
//! client as a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use insight_library_core::UserId;

use crate::services::accounts::AccountError;

/// Application-level error type for the functions service.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// No `Authorization` header on the request.
    #[error("Missing authorization header")]
    MissingAuth,

    /// The bearer token did not resolve to an account.
    #[error("Invalid user token")]
    InvalidToken,

    /// The caller's role does not permit the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed or incomplete request body.
    #[error("{0}")]
    BadRequest(String),

    /// The identity backend refused the mutation.
    #[error("{0}")]
    Upstream(String),

    /// Target does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AccountError> for FunctionError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidToken => Self::InvalidToken,
            AccountError::Forbidden(msg) => Self::Forbidden(msg),
            AccountError::Validation(msg) => Self::BadRequest(msg),
            AccountError::NotFound(msg) => Self::NotFound(msg),
            AccountError::Upstream(msg) => Self::Upstream(msg),
            AccountError::Identity(_) | AccountError::Repository(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for FunctionError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Function request error"
            );
        }

        let status = match &self {
            Self::MissingAuth | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Upstream(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Set the Sentry user context for the authenticated caller.
pub fn set_sentry_user(user_id: UserId, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;

    fn get_status(err: FunctionError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_function_error_status_codes() {
        assert_eq!(get_status(FunctionError::MissingAuth), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(FunctionError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_status(FunctionError::Forbidden("no".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(FunctionError::Upstream("duplicate".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(FunctionError::NotFound("User not found".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(FunctionError::Internal("db down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_account_errors_map_to_function_errors() {
        assert!(matches!(
            FunctionError::from(AccountError::Validation("Email is required".to_string())),
            FunctionError::BadRequest(msg) if msg == "Email is required"
        ));
        assert!(matches!(
            FunctionError::from(AccountError::Repository(RepositoryError::NotFound)),
            FunctionError::Internal(_)
        ));
        assert!(matches!(
            FunctionError::from(AccountError::InvalidToken),
            FunctionError::InvalidToken
        ));
    }

    #[test]
    fn test_function_error_messages() {
        assert_eq!(FunctionError::MissingAuth.to_string(), "Missing authorization header");
        assert_eq!(FunctionError::InvalidToken.to_string(), "Invalid user token");
        assert_eq!(
            FunctionError::Forbidden("Only admins can create users".to_string()).to_string(),
            "Only admins can create users"
        );
    }
}
