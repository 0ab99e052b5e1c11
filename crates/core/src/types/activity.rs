//! Activity audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityLogId, AppUser, Role, UserId};

/// Kind of account action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    RoleChange,
    ProfileUpdate,
    PasswordChange,
    PasswordReset,
    UserCreate,
    UserDelete,
}

impl ActivityAction {
    pub const ALL: [Self; 6] = [
        Self::RoleChange,
        Self::ProfileUpdate,
        Self::PasswordChange,
        Self::PasswordReset,
        Self::UserCreate,
        Self::UserDelete,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoleChange => "role_change",
            Self::ProfileUpdate => "profile_update",
            Self::PasswordChange => "password_change",
            Self::PasswordReset => "password_reset",
            Self::UserCreate => "user_create",
            Self::UserDelete => "user_delete",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown action type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown activity action: {0}")]
pub struct ActivityActionParseError(pub String);

impl std::str::FromStr for ActivityAction {
    type Err = ActivityActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ActivityActionParseError(s.to_owned()))
    }
}

/// A stored audit entry. Append-only: never updated or deleted.
///
/// Actor email and role are denormalized at write time so the entry stays
/// meaningful after the actor's profile changes or is removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: ActivityLogId,
    pub actor_id: UserId,
    pub actor_email: String,
    pub actor_role: Role,
    pub action_type: ActivityAction,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    #[serde(default)]
    pub target_user_email: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit entry about to be appended.
///
/// ```
/// use insight_library_core::{ActivityAction, NewActivityLog, Role, UserId};
///
/// let actor = UserId::random();
/// let target = UserId::random();
/// let entry = NewActivityLog::new(actor, "admin@x.com", Role::Admin, ActivityAction::PasswordReset)
///     .target(target, "user@x.com");
/// assert_eq!(entry.target_user_id, Some(target));
/// assert!(entry.details.as_object().is_some_and(|d| d.is_empty()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivityLog {
    pub actor_id: UserId,
    pub actor_email: String,
    pub actor_role: Role,
    pub action_type: ActivityAction,
    pub target_user_id: Option<UserId>,
    pub target_user_email: Option<String>,
    pub details: serde_json::Value,
}

impl NewActivityLog {
    #[must_use]
    pub fn new(
        actor_id: UserId,
        actor_email: impl Into<String>,
        actor_role: Role,
        action_type: ActivityAction,
    ) -> Self {
        Self {
            actor_id,
            actor_email: actor_email.into(),
            actor_role,
            action_type,
            target_user_id: None,
            target_user_email: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Entry attributed to the given profile.
    #[must_use]
    pub fn by(actor: &AppUser, action_type: ActivityAction) -> Self {
        Self::new(actor.id, actor.email.as_str(), actor.role, action_type)
    }

    #[must_use]
    pub fn target(mut self, id: UserId, email: impl Into<String>) -> Self {
        self.target_user_id = Some(id);
        self.target_user_email = Some(email.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Materialize as a stored entry.
    #[must_use]
    pub fn into_log(self, id: ActivityLogId, created_at: DateTime<Utc>) -> ActivityLog {
        ActivityLog {
            id,
            actor_id: self.actor_id,
            actor_email: self.actor_email,
            actor_role: self.actor_role,
            action_type: self.action_type,
            target_user_id: self.target_user_id,
            target_user_email: self.target_user_email,
            details: self.details,
            created_at,
        }
    }
}

/// Reader filter for the audit viewer: newest first, paged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogQuery {
    /// Exact action type match.
    #[serde(default)]
    pub action: Option<ActivityAction>,
    /// Case-insensitive substring over actor email, target email and action type.
    #[serde(default)]
    pub search: Option<String>,
    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
    #[serde(default = "ActivityLogQuery::default_page_size")]
    pub page_size: u32,
}

impl Default for ActivityLogQuery {
    fn default() -> Self {
        Self {
            action: None,
            search: None,
            page: 0,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ActivityLogQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    const fn default_page_size() -> u32 {
        Self::DEFAULT_PAGE_SIZE
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit())
    }

    /// Trimmed, lowercased search term; `None` when blank.
    #[must_use]
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether an entry passes the action and search filters (paging ignored).
    #[must_use]
    pub fn matches(&self, log: &ActivityLog) -> bool {
        if self.action.is_some_and(|action| action != log.action_type) {
            return false;
        }
        let Some(term) = self.search_term() else {
            return true;
        };
        log.actor_email.to_lowercase().contains(&term)
            || log
                .target_user_email
                .as_deref()
                .is_some_and(|email| email.to_lowercase().contains(&term))
            || log.action_type.as_str().contains(&term)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn log(action: ActivityAction, actor: &str, target: Option<&str>) -> ActivityLog {
        let mut entry = NewActivityLog::new(UserId::random(), actor, Role::Admin, action);
        if let Some(target) = target {
            entry = entry.target(UserId::random(), target);
        }
        entry.into_log(ActivityLogId::random(), Utc::now())
    }

    #[test]
    fn test_action_parse_and_serde_agree() {
        for action in ActivityAction::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(action.as_str().parse::<ActivityAction>().unwrap(), action);
        }
        assert!("login".parse::<ActivityAction>().is_err());
    }

    #[test]
    fn test_query_defaults() {
        let query: ActivityLogQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query, ActivityLogQuery::default());
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_query_paging_is_clamped() {
        let query = ActivityLogQuery {
            page: 3,
            page_size: 0,
            ..ActivityLogQuery::default()
        };
        assert_eq!(query.limit(), 1);
        assert_eq!(query.offset(), 3);

        let query = ActivityLogQuery {
            page: 2,
            page_size: 10_000,
            ..ActivityLogQuery::default()
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(query.offset(), 200);
    }

    #[test]
    fn test_query_filters_by_action() {
        let query = ActivityLogQuery {
            action: Some(ActivityAction::UserCreate),
            ..ActivityLogQuery::default()
        };
        assert!(query.matches(&log(ActivityAction::UserCreate, "a@x.com", None)));
        assert!(!query.matches(&log(ActivityAction::UserDelete, "a@x.com", None)));
    }

    #[test]
    fn test_query_search_covers_emails_and_action() {
        let query = ActivityLogQuery {
            search: Some("  BOB ".to_owned()),
            ..ActivityLogQuery::default()
        };
        assert!(query.matches(&log(ActivityAction::RoleChange, "bob@x.com", None)));
        assert!(query.matches(&log(
            ActivityAction::RoleChange,
            "alice@x.com",
            Some("bob@x.com")
        )));
        assert!(!query.matches(&log(ActivityAction::RoleChange, "alice@x.com", None)));

        let query = ActivityLogQuery {
            search: Some("reset".to_owned()),
            ..ActivityLogQuery::default()
        };
        assert!(query.matches(&log(ActivityAction::PasswordReset, "alice@x.com", None)));
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let query = ActivityLogQuery {
            search: Some("   ".to_owned()),
            ..ActivityLogQuery::default()
        };
        assert!(query.search_term().is_none());
        assert!(query.matches(&log(ActivityAction::UserDelete, "a@x.com", None)));
    }
}
