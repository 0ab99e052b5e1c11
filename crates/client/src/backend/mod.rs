//! Backend primitives consumed by the client.
//!
//! The client never talks to the identity backend with elevated credentials.
//! It signs in, signs up, signs out, refreshes tokens and reads profile rows
//! with the public key plus the user's own access token. Everything
//! privileged goes through the functions service instead.

pub mod gotrue;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use insight_library_core::{AppUser, UserId};

pub use gotrue::HttpBackend;
pub use memory::MemoryBackend;

/// Errors returned by the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend refused the request (bad credentials, duplicate account,
    /// expired refresh token, ...). The message is the backend's own.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Transport failure.
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with something we could not interpret.
    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),
}

/// Identity the session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
}

/// A backend-issued token pair.
///
/// Persisted as JSON in the session slot. `Debug` output redacts both tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    /// Whether the access token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= margin
    }
}

/// Operations the client needs from the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Password sign-in.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// Create an account with `display_name` stored as account metadata.
    ///
    /// Returns the session the backend issued, if it issued one.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError>;

    /// Revoke a session.
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    /// Read the profile row for `user_id`; `None` when there is no row.
    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Option<AppUser>, BackendError>;
}

/// Pull a human-readable message out of an error body.
///
/// Auth endpoints, the table API and the functions service each use a
/// different field, so the usual candidates are tried in order before
/// falling back to the raw body.
#[must_use]
pub fn error_message(body: &str) -> String {
    const FIELDS: [&str; 4] = ["msg", "error_description", "message", "error"];

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = FIELDS
            .iter()
            .filter_map(|field| map.get(*field).and_then(serde_json::Value::as_str))
            .find(|message| !message.trim().is_empty())
        {
            return message.to_owned();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "backend error".to_owned()
    } else {
        trimmed.to_owned()
    }
}
