//! Client error types.

use thiserror::Error;

use insight_library_core::{EmailError, PolicyViolation};

use crate::backend::BackendError;
use crate::storage::StorageError;

/// Errors from the auth context operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend's own error, unchanged (bad credentials, duplicate account, ...).
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Signed in, but no profile row could be resolved.
    #[error("Could not load user profile")]
    Profile,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<EmailError> for AuthError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Errors from [`crate::admin::UserAdmin`].
#[derive(Debug, Error)]
pub enum AdminClientError {
    /// No signed-in, profile-backed session.
    #[error("You must be signed in")]
    NotSignedIn,

    /// Refused locally before any request was sent.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    /// Form input rejected locally before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// The functions service answered with `{ "error": message }`.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("functions request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected functions response: {0}")]
    InvalidResponse(String),
}

impl From<EmailError> for AdminClientError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl AdminClientError {
    /// HTTP status when the server refused the request.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
