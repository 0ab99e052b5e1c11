//! Application-level user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Email, Role, UserId};

/// Longest display name accepted by profile edits.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Profile row associated with an identity-backend account.
///
/// One profile exists per account id. Serialized with the same field names
/// as the `users` table so the row can be read directly from the REST
/// interface of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: UserId,
    pub email: Email,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

impl AppUser {
    /// `true` when the profile role is `admin`.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// `true` when the profile role is `admin` or `moderator`.
    #[must_use]
    pub const fn is_moderator(&self) -> bool {
        self.role.is_moderator()
    }

    /// Display name, falling back to the email local part.
    #[must_use]
    pub fn name(&self) -> String {
        self.email
            .display_name_or_local_part(self.display_name.as_deref())
    }
}
