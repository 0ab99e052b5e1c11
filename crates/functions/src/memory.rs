//! In-memory backends.
//!
//! Used by unit tests, the integration test suite and local development
//! without a database or identity server. Behavior mirrors the real backends
//! closely enough to exercise every authorization path: tokens are opaque,
//! duplicate emails are refused, passwords are checked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use insight_library_core::{
    ActivityLog, ActivityLogId, ActivityLogQuery, AppUser, Email, NewActivityLog,
    NewNotification, Notification, NotificationId, Role, UserCredentials, UserId,
};

use crate::db::{
    ActivityLogStore, NewProfile, NotificationStore, ProfileStore, RepositoryError,
};
use crate::identity::{IdentityError, IdentityProvider, IdentityUser, NewAccount};
use crate::services::accounts::AccountService;
use crate::services::email::{MailError, WelcomeMailer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone)]
struct Account {
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct IdentityState {
    accounts: HashMap<UserId, Account>,
    tokens: HashMap<String, UserId>,
    failing_deletes: bool,
}

/// Identity backend holding accounts and issued tokens in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    state: Mutex<IdentityState>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account directly, bypassing duplicate checks.
    pub fn insert_account(&self, id: UserId, email: &str, password: &str) {
        lock(&self.state).accounts.insert(
            id,
            Account {
                email: email.trim().to_lowercase(),
                password: password.to_owned(),
            },
        );
    }

    /// Issue an access token for an account.
    #[must_use]
    pub fn issue_token(&self, id: UserId) -> String {
        let token = format!("token-{}", uuid::Uuid::new_v4());
        lock(&self.state).tokens.insert(token.clone(), id);
        token
    }

    /// Invalidate a previously issued token.
    pub fn revoke_token(&self, token: &str) {
        lock(&self.state).tokens.remove(token);
    }

    /// Current password of an account, `None` once deleted.
    #[must_use]
    pub fn password_of(&self, id: UserId) -> Option<String> {
        lock(&self.state)
            .accounts
            .get(&id)
            .map(|account| account.password.clone())
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        lock(&self.state).accounts.len()
    }

    /// Make subsequent account deletions fail as a backend outage.
    pub fn fail_deletes(&self, failing: bool) {
        lock(&self.state).failing_deletes = failing;
    }

    fn user(id: UserId, account: &Account) -> IdentityUser {
        IdentityUser {
            id,
            email: account.email.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        let state = lock(&self.state);
        state
            .tokens
            .get(access_token)
            .and_then(|id| state.accounts.get(id).map(|account| Self::user(*id, account)))
            .ok_or(IdentityError::InvalidToken)
    }

    async fn create_user(&self, account: &NewAccount) -> Result<IdentityUser, IdentityError> {
        let mut state = lock(&self.state);
        if state
            .accounts
            .values()
            .any(|existing| account.email.matches(&existing.email))
        {
            return Err(IdentityError::Rejected {
                status: 422,
                message: "A user with this email address has already been registered".to_owned(),
            });
        }

        let id = UserId::random();
        let stored = Account {
            email: account.email.as_str().to_lowercase(),
            password: account.password.expose_secret().to_owned(),
        };
        let user = Self::user(id, &stored);
        state.accounts.insert(id, stored);
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<IdentityUser>, IdentityError> {
        Ok(lock(&self.state)
            .accounts
            .get(&id)
            .map(|account| Self::user(id, account)))
    }

    async fn set_password(&self, id: UserId, password: &SecretString) -> Result<(), IdentityError> {
        let mut state = lock(&self.state);
        let account = state.accounts.get_mut(&id).ok_or(IdentityError::Rejected {
            status: 404,
            message: "User not found".to_owned(),
        })?;
        password.expose_secret().clone_into(&mut account.password);
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), IdentityError> {
        let mut state = lock(&self.state);
        if state.failing_deletes {
            return Err(IdentityError::Rejected {
                status: 500,
                message: "backend down".to_owned(),
            });
        }
        if state.accounts.remove(&id).is_none() {
            return Err(IdentityError::Rejected {
                status: 404,
                message: "User not found".to_owned(),
            });
        }
        state.tokens.retain(|_, owner| *owner != id);
        Ok(())
    }

    async fn verify_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<bool, IdentityError> {
        Ok(lock(&self.state).accounts.values().any(|account| {
            account.email.eq_ignore_ascii_case(email.trim())
                && account.password == *password.expose_secret()
        }))
    }
}

// =============================================================================
// Profiles
// =============================================================================

/// Profile store over a map.
#[derive(Debug, Default)]
pub struct MemoryProfiles {
    rows: Mutex<HashMap<UserId, AppUser>>,
    failing_provision: Mutex<bool>,
}

impl MemoryProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: AppUser) {
        lock(&self.rows).insert(user.id, user);
    }

    /// Make subsequent [`ProfileStore::provision`] calls fail.
    pub fn fail_provisioning(&self, failing: bool) {
        *lock(&self.failing_provision) = failing;
    }

    /// Synchronous read for assertions.
    #[must_use]
    pub fn get_sync(&self, id: UserId) -> Option<AppUser> {
        lock(&self.rows).get(&id).cloned()
    }

    fn modify(
        &self,
        id: UserId,
        change: impl FnOnce(&mut AppUser),
    ) -> Result<AppUser, RepositoryError> {
        let mut rows = lock(&self.rows);
        let user = rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        change(user);
        Ok(user.clone())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn get(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError> {
        Ok(self.get_sync(id))
    }

    async fn provision(&self, profile: &NewProfile) -> Result<AppUser, RepositoryError> {
        if *lock(&self.failing_provision) {
            return Err(RepositoryError::DataCorruption(
                "profile storage unavailable".to_owned(),
            ));
        }
        let mut rows = lock(&self.rows);
        let created_at = rows.get(&profile.id).map_or_else(Utc::now, |u| u.created_at);
        let user = AppUser {
            id: profile.id,
            email: profile.email.clone(),
            display_name: Some(profile.display_name.clone()),
            avatar_url: None,
            role: profile.role,
            is_approved: profile.is_approved,
            created_at,
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_role(&self, id: UserId, role: Role) -> Result<AppUser, RepositoryError> {
        self.modify(id, |user| user.role = role)
    }

    async fn set_approved(&self, id: UserId, approved: bool) -> Result<AppUser, RepositoryError> {
        self.modify(id, |user| user.is_approved = approved)
    }

    async fn update_display_name(
        &self,
        id: UserId,
        display_name: Option<&str>,
    ) -> Result<AppUser, RepositoryError> {
        self.modify(id, |user| user.display_name = display_name.map(str::to_owned))
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        lock(&self.rows).remove(&id);
        Ok(())
    }

    async fn list(&self, pending_only: bool) -> Result<Vec<AppUser>, RepositoryError> {
        let mut users: Vec<AppUser> = lock(&self.rows)
            .values()
            .filter(|user| !pending_only || !user.is_approved)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// =============================================================================
// Activity log
// =============================================================================

/// Append-only audit log in a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityLog>>,
    failing: Mutex<bool>,
}

impl MemoryActivityLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail with a storage error.
    pub fn fail_appends(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<ActivityLog> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl ActivityLogStore for MemoryActivityLog {
    async fn append(&self, entry: &NewActivityLog) -> Result<ActivityLog, RepositoryError> {
        if *lock(&self.failing) {
            return Err(RepositoryError::DataCorruption(
                "activity log unavailable".to_owned(),
            ));
        }
        let log = entry
            .clone()
            .into_log(ActivityLogId::random(), Utc::now());
        lock(&self.entries).push(log.clone());
        Ok(log)
    }

    async fn list(&self, query: &ActivityLogQuery) -> Result<Vec<ActivityLog>, RepositoryError> {
        let entries = lock(&self.entries);
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit()).unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .rev()
            .filter(|log| query.matches(log))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification store in a `Vec`, oldest first.
#[derive(Debug, Default)]
pub struct MemoryNotifications {
    rows: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotifications {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail with a storage error.
    pub fn fail_inserts(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Every stored notification, in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Notification> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotifications {
    async fn create(&self, notification: &NewNotification) -> Result<Notification, RepositoryError> {
        if *lock(&self.failing) {
            return Err(RepositoryError::DataCorruption(
                "notifications unavailable".to_owned(),
            ));
        }
        let stored = notification
            .clone()
            .into_notification(NotificationId::random(), Utc::now());
        lock(&self.rows).push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, user_id: UserId, limit: u32) -> Result<Vec<Notification>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(lock(&self.rows)
            .iter()
            .rev()
            .filter(|note| note.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let count = lock(&self.rows)
            .iter()
            .filter(|note| note.user_id == user_id && !note.is_read)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError> {
        let mut rows = lock(&self.rows);
        let note = rows
            .iter_mut()
            .find(|note| note.id == id && note.user_id == user_id)
            .ok_or(RepositoryError::NotFound)?;
        if !note.is_read {
            note.is_read = true;
            note.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut changed = 0;
        for note in lock(&self.rows)
            .iter_mut()
            .filter(|note| note.user_id == user_id && !note.is_read)
        {
            note.is_read = true;
            note.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|note| !(note.id == id && note.user_id == user_id));
        if rows.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Mailer
// =============================================================================

/// Mailer that records welcome emails instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<UserCredentials>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail.
    pub fn fail(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<UserCredentials> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl WelcomeMailer for RecordingMailer {
    async fn send_welcome(&self, credentials: &UserCredentials) -> Result<(), MailError> {
        if *lock(&self.failing) {
            return Err(MailError::InvalidAddress(credentials.email.clone()));
        }
        lock(&self.sent).push(credentials.clone());
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// All in-memory backends, shared with the service built from them.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackends {
    pub identity: Arc<MemoryIdentity>,
    pub profiles: Arc<MemoryProfiles>,
    pub activity: Arc<MemoryActivityLog>,
    pub notifications: Arc<MemoryNotifications>,
    pub mailer: Arc<RecordingMailer>,
}

impl MemoryBackends {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Account service over these backends, with the recording mailer.
    #[must_use]
    pub fn account_service(&self, site_url: &str) -> AccountService {
        AccountService::new(
            self.identity.clone(),
            self.profiles.clone(),
            self.activity.clone(),
            self.notifications.clone(),
            Some(self.mailer.clone() as Arc<dyn WelcomeMailer>),
            site_url,
        )
    }

    /// Create an account with a profile and return it with a fresh token.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn seed_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
        is_approved: bool,
    ) -> (AppUser, String) {
        let email = Email::parse(email).expect("seed email must be valid");
        let user = AppUser {
            id: UserId::random(),
            email,
            display_name: None,
            avatar_url: None,
            role,
            is_approved,
            created_at: Utc::now(),
        };
        self.identity
            .insert_account(user.id, user.email.as_str(), password);
        self.profiles.insert(user.clone());
        let token = self.identity.issue_token(user.id);
        (user, token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use insight_library_core::ActivityAction;

    use super::*;

    #[tokio::test]
    async fn test_tokens_resolve_until_revoked() {
        let backends = MemoryBackends::new();
        let (user, token) = backends.seed_user("a@studio.test", "secret-1", Role::User, true);

        let resolved = backends.identity.user_from_token(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.email, "a@studio.test");

        backends.identity.revoke_token(&token);
        assert!(matches!(
            backends.identity.user_from_token(&token).await,
            Err(IdentityError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let backends = MemoryBackends::new();
        backends.seed_user("a@studio.test", "secret-1", Role::User, true);

        let identity = &backends.identity;
        assert!(identity
            .verify_password("A@studio.test", &SecretString::from("secret-1"))
            .await
            .unwrap());
        assert!(!identity
            .verify_password("a@studio.test", &SecretString::from("nope"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_notifications_are_scoped_to_their_recipient() {
        let store = MemoryNotifications::new();
        let reader = UserId::random();
        let other = UserId::random();
        let first = store
            .create(&NewNotification::role_changed(reader, Role::User, Role::Moderator, "a@x.com"))
            .await
            .unwrap();
        store
            .create(&NewNotification::profile_updated(reader, "a@x.com", serde_json::json!({})))
            .await
            .unwrap();

        let listed = store.list(reader, 50).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(store.unread_count(reader).await.unwrap(), 2);

        assert!(matches!(
            store.mark_read(other, first.id).await,
            Err(RepositoryError::NotFound)
        ));
        store.mark_read(reader, first.id).await.unwrap();
        assert_eq!(store.unread_count(reader).await.unwrap(), 1);
        assert_eq!(store.mark_all_read(reader).await.unwrap(), 1);
        assert_eq!(store.unread_count(reader).await.unwrap(), 0);

        store.delete(reader, first.id).await.unwrap();
        assert!(matches!(
            store.delete(reader, first.id).await,
            Err(RepositoryError::NotFound)
        ));
        assert_eq!(store.list(reader, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activity_list_is_newest_first_and_paged() {
        let log = MemoryActivityLog::new();
        let actor = UserId::random();
        for action in [
            ActivityAction::UserCreate,
            ActivityAction::RoleChange,
            ActivityAction::PasswordReset,
        ] {
            log.append(&NewActivityLog::new(actor, "admin@studio.test", Role::Admin, action))
                .await
                .unwrap();
        }

        let query = ActivityLogQuery {
            page_size: 2,
            ..ActivityLogQuery::default()
        };
        let first = log.list(&query).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].action_type, ActivityAction::PasswordReset);

        let second = log
            .list(&ActivityLogQuery { page: 1, ..query })
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].action_type, ActivityAction::UserCreate);
    }
}
