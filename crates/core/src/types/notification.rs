//! Notifications addressed to a single user.
//!
//! Written when someone else changes the user's account (role, profile) and
//! read back by that user only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{NotificationId, Role, UserId};

/// Maximum number of notifications returned by a listing.
pub const NOTIFICATION_LIST_LIMIT: u32 = 50;

/// What happened to the recipient's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RoleChange,
    ProfileUpdated,
}

impl NotificationKind {
    pub const ALL: [Self; 2] = [Self::RoleChange, Self::ProfileUpdated];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoleChange => "role_change",
            Self::ProfileUpdated => "profile_updated",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown notification type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification type: {0}")]
pub struct NotificationKindParseError(pub String);

impl std::str::FromStr for NotificationKind {
    type Err = NotificationKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NotificationKindParseError(s.to_owned()))
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// A notification about to be stored, unread.
///
/// ```
/// use insight_library_core::{NewNotification, NotificationKind, Role, UserId};
///
/// let note = NewNotification::role_changed(UserId::random(), Role::User, Role::Moderator, "admin@x.com");
/// assert_eq!(note.kind, NotificationKind::RoleChange);
/// assert_eq!(note.message, "Your role has been changed from user to moderator.");
/// assert_eq!(note.metadata["changedBy"], "admin@x.com");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl NewNotification {
    /// The recipient's role was changed by `changed_by`.
    #[must_use]
    pub fn role_changed(user_id: UserId, old_role: Role, new_role: Role, changed_by: &str) -> Self {
        Self {
            user_id,
            kind: NotificationKind::RoleChange,
            title: "Your role has been updated".to_owned(),
            message: format!("Your role has been changed from {old_role} to {new_role}."),
            metadata: json!({
                "oldRole": old_role,
                "newRole": new_role,
                "changedBy": changed_by,
            }),
        }
    }

    /// An administrator edited the recipient's profile.
    #[must_use]
    pub fn profile_updated(user_id: UserId, updated_by: &str, changes: serde_json::Value) -> Self {
        Self {
            user_id,
            kind: NotificationKind::ProfileUpdated,
            title: "Your profile was updated".to_owned(),
            message: "An administrator has updated your profile information.".to_owned(),
            metadata: json!({ "updatedBy": updated_by, "changes": changes }),
        }
    }

    /// Materialize as a stored, unread notification.
    #[must_use]
    pub fn into_notification(self, id: NotificationId, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            is_read: false,
            metadata: self.metadata,
            created_at,
            read_at: None,
        }
    }
}
