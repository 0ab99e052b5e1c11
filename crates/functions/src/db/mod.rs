//! Persistence for profiles and the activity audit log.
//!
//! ## Tables
//!
//! - `users` - Application profile rows, keyed by the identity-backend account id
//! - `activity_logs` - Append-only audit of account actions
//! - `notifications` - Per-user notices about changes made by someone else
//!
//! # Migrations
//!
//! Migrations are stored in `crates/functions/migrations/` and run via:
//! ```bash
//! cargo run -p insight-library-cli -- migrate
//! ```
//!
//! Handlers never talk to `sqlx` directly: they go through the
//! [`ProfileStore`], [`ActivityLogStore`] and [`NotificationStore`] traits so the same service code
//! runs against `PostgreSQL` or the in-memory stores in [`crate::memory`].

pub mod activity_logs;
pub mod notifications;
pub mod profiles;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use insight_library_core::{
    ActivityLog, ActivityLogQuery, AppUser, Email, NewActivityLog, NewNotification,
    Notification, NotificationId, Role, UserId,
};

pub use activity_logs::PgActivityLogStore;
pub use notifications::PgNotificationStore;
pub use profiles::PgProfileStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// Profile row to create (or overwrite) when an account is provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
    pub role: Role,
    pub is_approved: bool,
}

/// Storage for [`AppUser`] profile rows.
///
/// Updates carry no version column: concurrent edits to one row are last
/// write wins.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile by account id.
    async fn get(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError>;

    /// Insert a profile, or overwrite role, approval, email and display name
    /// of an existing row with the same id.
    async fn provision(&self, profile: &NewProfile) -> Result<AppUser, RepositoryError>;

    /// Set the role. Returns [`RepositoryError::NotFound`] for unknown ids.
    async fn update_role(&self, id: UserId, role: Role) -> Result<AppUser, RepositoryError>;

    /// Set the approval flag. Returns [`RepositoryError::NotFound`] for unknown ids.
    async fn set_approved(&self, id: UserId, approved: bool) -> Result<AppUser, RepositoryError>;

    /// Replace the display name (`None` clears it).
    async fn update_display_name(
        &self,
        id: UserId,
        display_name: Option<&str>,
    ) -> Result<AppUser, RepositoryError>;

    /// Remove a profile row. Missing rows are not an error.
    async fn delete(&self, id: UserId) -> Result<(), RepositoryError>;

    /// All profiles, newest first; only unapproved ones when `pending_only`.
    async fn list(&self, pending_only: bool) -> Result<Vec<AppUser>, RepositoryError>;

    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Append-only storage for audit entries.
#[async_trait]
pub trait ActivityLogStore: Send + Sync {
    async fn append(&self, entry: &NewActivityLog) -> Result<ActivityLog, RepositoryError>;

    /// Entries matching the query filters, newest first, one page.
    async fn list(&self, query: &ActivityLogQuery) -> Result<Vec<ActivityLog>, RepositoryError>;
}

/// Storage for per-user notifications.
///
/// Every read and update is scoped to the recipient: a user can never see or
/// mark another user's notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> Result<Notification, RepositoryError>;

    /// The recipient's most recent notifications, newest first.
    async fn list(&self, user_id: UserId, limit: u32) -> Result<Vec<Notification>, RepositoryError>;

    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    /// Mark one notification read. Returns [`RepositoryError::NotFound`] when
    /// it does not exist or belongs to someone else.
    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError>;

    /// Mark every unread notification read; returns how many changed.
    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    /// Delete one notification. Returns [`RepositoryError::NotFound`] like
    /// [`NotificationStore::mark_read`].
    async fn delete(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Embedded migrations for the functions database.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
