//! Session store.
//!
//! Owns the persisted token pair. Every change is announced on a broadcast
//! channel as an [`AuthEvent`]; the auth context is the main subscriber.
//!
//! A session that expires within [`REFRESH_MARGIN_SECS`] is refreshed when read.
//! A failed refresh destroys the session and announces `SignedOut`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::{AuthBackend, BackendError, Session};
use crate::storage::{LocalStorage, StorageError};

/// Storage slot holding the persisted session.
pub const SESSION_STORAGE_KEY: &str = "game-industry-insight-auth";

/// Sessions closer than this many seconds to expiry are refreshed on access.
pub const REFRESH_MARGIN_SECS: i64 = 60;

fn expiring(session: &Session) -> bool {
    session.expires_within(Duration::seconds(REFRESH_MARGIN_SECS), Utc::now())
}

const EVENT_CAPACITY: usize = 32;

/// Auth state notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Emitted once at startup with whatever session was restored.
    InitialSession(Option<Session>),
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// Persisted session plus its change notifications.
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    storage: LocalStorage,
    events: broadcast::Sender<AuthEvent>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, storage: LocalStorage) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            storage,
            events,
            refresh_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.backend
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// The persisted session as stored, without refreshing.
    ///
    /// An unreadable slot is cleared and treated as empty.
    #[must_use]
    pub fn stored(&self) -> Option<Session> {
        match self.storage.get_json::<Session>(SESSION_STORAGE_KEY) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                if let Err(e) = self.storage.remove_item(SESSION_STORAGE_KEY) {
                    warn!(error = %e, "Failed to clear stored session");
                }
                None
            }
        }
    }

    /// Current session, refreshed first if it is about to expire.
    ///
    /// Returns `None` when there is no session or the refresh failed.
    ///
    /// # Errors
    ///
    /// Returns an error only if a refreshed session cannot be persisted.
    pub async fn get_session(&self) -> Result<Option<Session>, StorageError> {
        match self.stored() {
            Some(session) if expiring(&session) => {
                self.refresh_if_expiring().await
            }
            other => Ok(other),
        }
    }

    /// Restore the persisted session at startup and announce it.
    ///
    /// # Errors
    ///
    /// Returns an error only if a refreshed session cannot be persisted.
    pub async fn initial_session(&self) -> Result<Option<Session>, StorageError> {
        let session = self.get_session().await?;
        self.emit(AuthEvent::InitialSession(session.clone()));
        Ok(session)
    }

    /// Password sign-in. The session is returned but not persisted; see
    /// [`SessionStore::commit`].
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.backend.sign_in_with_password(email, password).await
    }

    /// Persist a session and announce `SignedIn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub fn commit(&self, session: Session) -> Result<(), StorageError> {
        self.storage.set_json(SESSION_STORAGE_KEY, &session)?;
        info!(user_id = %session.user.id, "Signed in");
        self.emit(AuthEvent::SignedIn(session));
        Ok(())
    }

    /// Revoke a session that was never committed. Failures are logged.
    pub async fn revoke(&self, session: &Session) {
        if let Err(e) = self.backend.sign_out(&session.access_token).await {
            warn!(error = %e, user_id = %session.user.id, "Failed to revoke session");
        }
    }

    /// Revoke the persisted session and clear it. Local state is cleared
    /// even when the backend cannot be reached.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Some(session) = self.stored() {
            self.revoke(&session).await;
        }
        self.clear();
    }

    /// Exchange the stored refresh token unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error only if the new session cannot be persisted.
    pub async fn refresh(&self) -> Result<Option<Session>, StorageError> {
        let _guard = self.refresh_lock.lock().await;
        let Some(session) = self.stored() else {
            return Ok(None);
        };
        self.exchange(&session).await
    }

    async fn refresh_if_expiring(&self) -> Result<Option<Session>, StorageError> {
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        match self.stored() {
            Some(session) if expiring(&session) => {
                self.exchange(&session).await
            }
            other => Ok(other),
        }
    }

    async fn exchange(&self, session: &Session) -> Result<Option<Session>, StorageError> {
        match self.backend.refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                self.storage.set_json(SESSION_STORAGE_KEY, &fresh)?;
                debug!(user_id = %fresh.user.id, "Session refreshed");
                self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(e) => {
                warn!(error = %e, user_id = %session.user.id, "Session refresh failed, signing out");
                self.clear();
                Ok(None)
            }
        }
    }

    fn clear(&self) {
        if let Err(e) = self.storage.remove_item(SESSION_STORAGE_KEY) {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.emit(AuthEvent::SignedOut);
    }

    /// Check the session every `period`, refreshing it ahead of expiry.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = store.get_session().await {
                    warn!(error = %e, "Auto-refresh could not persist session");
                }
            }
        })
    }
}
