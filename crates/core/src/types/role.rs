//! Application roles.

use serde::{Deserialize, Serialize};

/// Error returned when a role string is not one of `admin`, `moderator`, `user`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0} (expected admin, moderator or user)")]
pub struct RoleParseError(pub String);

/// Application role stored on the profile row.
///
/// Capabilities nest: `Admin ⊇ Moderator ⊇ User`. The variant order matches
/// that ordering so `Role::Admin > Role::Moderator` holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular reader. Default for self-registered and invited accounts.
    #[default]
    User,
    /// May open user management and review pending accounts.
    Moderator,
    /// Full management access, subject to the admin-on-admin restriction.
    Admin,
}

impl Role {
    /// Every role, least to most capable.
    pub const ALL: [Self; 3] = [Self::User, Self::Moderator, Self::Admin];

    /// Wire/database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// `true` for `Admin`.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// `true` for `Admin` and `Moderator`.
    #[must_use]
    pub const fn is_moderator(self) -> bool {
        matches!(self, Self::Admin | Self::Moderator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            other => Err(RoleParseError(other.to_owned())),
        }
    }
}
