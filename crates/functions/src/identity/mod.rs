//! Identity backend access.
//!
//! Every privileged request re-derives the caller from their access token
//! through [`IdentityProvider::user_from_token`]; role claims supplied by the
//! client are never trusted. Account mutations (create, password overwrite,
//! delete) use the service credential held by the implementation.

pub mod gotrue;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use insight_library_core::{Email, UserId};

pub use gotrue::GoTrueClient;

/// Errors returned by the identity backend.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The access token is missing, expired or revoked.
    #[error("invalid access token")]
    InvalidToken,

    /// The backend refused the operation (duplicate email, weak password, ...).
    /// The message is the backend's own and is safe to show to the caller.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Transport failure talking to the backend.
    #[error("identity backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with something we could not interpret.
    #[error("unexpected identity backend response: {0}")]
    InvalidResponse(String),
}

/// An account as known to the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityUser {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
}

/// Input for creating a pre-confirmed account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: Email,
    pub password: SecretString,
    /// Stored as account metadata.
    pub display_name: String,
}

/// Operations the functions service needs from the identity backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the account behind a user access token.
    async fn user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError>;

    /// Create an account with a known password and a confirmed email.
    async fn create_user(&self, account: &NewAccount) -> Result<IdentityUser, IdentityError>;

    /// Look up an account by id; `None` when it does not exist.
    async fn get_user(&self, id: UserId) -> Result<Option<IdentityUser>, IdentityError>;

    /// Overwrite an account's password.
    async fn set_password(&self, id: UserId, password: &SecretString) -> Result<(), IdentityError>;

    /// Remove an account.
    async fn delete_user(&self, id: UserId) -> Result<(), IdentityError>;

    /// Check an email/password pair without keeping the resulting session.
    async fn verify_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<bool, IdentityError>;
}

/// Pull a human-readable message out of a backend error body.
///
/// The backend is inconsistent about the field name, so the usual candidates
/// are tried in order before falling back to the raw body.
#[must_use]
pub fn error_message(body: &str) -> String {
    const FIELDS: [&str; 4] = ["msg", "error_description", "message", "error"];

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for field in FIELDS {
            if let Some(message) = map.get(field).and_then(serde_json::Value::as_str) {
                if !message.trim().is_empty() {
                    return message.to_owned();
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "identity backend error".to_owned()
    } else {
        trimmed.to_owned()
    }
}
