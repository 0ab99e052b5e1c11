//! Insight Library client.
//!
//! Client-side half of the account stack:
//! - [`session`] - Persisted token pair with refresh and auth events
//! - [`profile`] - Profile fetch bounded by a timeout
//! - [`context`] - The auth context and its derived flags
//! - [`admin`] - User management through the functions service, policy-checked locally first
//! - [`events`], [`counters`] - Cross-view invalidation and optimistic like/save counts
//! - [`view_mode`] - Grid/list preference synced across storage handles
//!
//! # Example
//!
//! ```no_run
//! use insight_library_client::{ClientConfig, InsightClient, LoginOutcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InsightClient::connect(ClientConfig::from_env()?)?;
//! client.start();
//! client.auth.wait_until_loaded().await;
//!
//! match client.auth.login("reader@studio.test", "secret1").await? {
//!     LoginOutcome::SignedIn => println!("welcome"),
//!     LoginOutcome::NeedsApproval => println!("pending approval"),
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin;
pub mod backend;
pub mod config;
pub mod context;
pub mod counters;
pub mod error;
pub mod events;
pub mod notice;
pub mod profile;
pub mod session;
pub mod storage;
pub mod view_mode;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use admin::{ActivityLogPage, Invitation, UserAdmin};
pub use backend::{AuthBackend, BackendError, HttpBackend, MemoryBackend, Session};
pub use config::{ClientConfig, ConfigError};
pub use context::{AuthContext, AuthState, LoginOutcome};
pub use counters::{FEED_QUERY_KEY, PostCounters, PostCounts};
pub use error::{AdminClientError, AuthError};
pub use events::{PostAction, PostUpdate, PostUpdateEvents, SavedPostsEvents, Subscription};
pub use notice::CredentialsNotice;
pub use storage::{LocalStorage, StorageError};
pub use view_mode::{ViewMode, ViewModePreference};

/// How often the background task checks the session for expiry.
pub const AUTO_REFRESH_PERIOD: Duration = Duration::from_secs(30);

/// Errors building an [`InsightClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Admin(#[from] AdminClientError),
}

/// Everything a front end needs, wired over one storage directory.
#[derive(Debug, Clone)]
pub struct InsightClient {
    pub auth: AuthContext,
    pub admin: UserAdmin,
    pub view_mode: Arc<ViewModePreference>,
    pub saved_posts: SavedPostsEvents,
    pub post_updates: PostUpdateEvents,
}

impl InsightClient {
    /// Wire the client to the HTTP backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory or an HTTP client cannot be
    /// created.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let backend: Arc<dyn AuthBackend> = Arc::new(HttpBackend::new(&config)?);
        Self::with_backend(&config, backend)
    }

    /// Wire the client to any backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory or the functions HTTP client
    /// cannot be created.
    pub fn with_backend(
        config: &ClientConfig,
        backend: Arc<dyn AuthBackend>,
    ) -> Result<Self, ClientError> {
        let storage = LocalStorage::open(&config.storage_dir)?;
        let auth = AuthContext::new(backend, storage.clone(), config);
        let admin = UserAdmin::new(config, auth.clone())?;
        Ok(Self {
            auth,
            admin,
            view_mode: Arc::new(ViewModePreference::load(storage)),
            saved_posts: SavedPostsEvents::new(),
            post_updates: PostUpdateEvents::new(),
        })
    }

    /// Start the background tasks: auth context startup and event
    /// following, session auto-refresh and view-mode sync.
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.auth.start(),
            self.auth.sessions().spawn_auto_refresh(AUTO_REFRESH_PERIOD),
            self.view_mode.spawn_sync(),
        ]
    }

    /// A counters view attached to this client's buses.
    #[must_use]
    pub fn counters(&self) -> PostCounters {
        PostCounters::attach(&self.post_updates, &self.saved_posts)
    }
}
