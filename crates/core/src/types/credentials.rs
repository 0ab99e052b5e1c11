//! One-shot credentials disclosure.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::Role;

/// Shortest password accepted for self-service password changes.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Freshly minted credentials returned to the admin who created or reset an
/// account.
///
/// Never persisted. The plaintext password exists only in the response that
/// carries this value; `Debug` output redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentials {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub site_url: String,
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .field("role", &self.role)
            .field("site_url", &self.site_url)
            .finish()
    }
}
