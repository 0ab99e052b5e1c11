//! Auth context: the single process-wide answer to "who is signed in and
//! what may they do".
//!
//! State lives in a [`watch`] channel so views can both read the current
//! value and await changes. The derived flags on [`AuthState`] are computed
//! from the session and profile on every read and never stored.
//!
//! Lifecycle:
//! 1. [`AuthContext::start`] restores the persisted session, loads its
//!    profile (bounded by the loader timeout) and then follows the session
//!    store's events.
//! 2. [`AuthContext::login`], [`AuthContext::register`],
//!    [`AuthContext::logout`] and [`AuthContext::refresh_user`] drive it
//!    from the UI.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use insight_library_core::{AppUser, Email};

use crate::backend::{AuthBackend, Session};
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::profile::ProfileLoader;
use crate::session::{AuthEvent, SessionStore};
use crate::storage::LocalStorage;

/// Snapshot of the auth context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<AppUser>,
    /// `true` until the startup sequence has settled.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            user: None,
            loading: true,
        }
    }
}

impl AuthState {
    const fn settled() -> Self {
        Self {
            session: None,
            user: None,
            loading: false,
        }
    }

    /// Session, profile and approval all present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.is_approved()
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_approved)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(AppUser::is_admin)
    }

    #[must_use]
    pub fn is_moderator(&self) -> bool {
        self.user.as_ref().is_some_and(AppUser::is_moderator)
    }
}

/// Result of a successful [`AuthContext::login`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn,
    /// Credentials were valid but the account awaits approval. Nothing was
    /// committed to the context.
    NeedsApproval,
}

/// Process-wide auth state container.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Arc<SessionStore>,
    profiles: ProfileLoader,
    state: watch::Sender<AuthState>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthContext {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, storage: LocalStorage, config: &ClientConfig) -> Self {
        let profiles = ProfileLoader::new(Arc::clone(&backend), config.profile_timeout);
        let sessions = Arc::new(SessionStore::new(backend, storage));
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(Inner {
                sessions,
                profiles,
                state,
            }),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.inner.sessions
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    #[must_use]
    pub fn is_moderator(&self) -> bool {
        self.inner.state.borrow().is_moderator()
    }

    /// The signed-in profile, if any.
    #[must_use]
    pub fn user(&self) -> Option<AppUser> {
        self.inner.state.borrow().user.clone()
    }

    /// A usable access token for the held session, refreshed if needed.
    pub async fn access_token(&self) -> Option<String> {
        if self.inner.state.borrow().session.is_none() {
            return None;
        }
        match self.inner.sessions.get_session().await {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                warn!(error = %e, "Could not persist refreshed session");
                None
            }
        }
    }

    /// Wait until the startup sequence has settled.
    pub async fn wait_until_loaded(&self) -> AuthState {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|state| !state.loading)
            .await
            .map(|state| AuthState::clone(&state));
        settled.unwrap_or_else(|_| self.state())
    }

    /// Restore the persisted session and follow session events until the
    /// returned task is aborted.
    pub fn start(&self) -> JoinHandle<()> {
        // Subscribe before restoring so no event is missed.
        let mut events = self.inner.sessions.subscribe();
        let context = self.clone();
        tokio::spawn(async move {
            context.initialize().await;
            loop {
                match events.recv().await {
                    Ok(event) => context.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Auth event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Startup sequence. `loading` is false once this returns, whatever
    /// happened to the profile fetch.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        let session = match self.inner.sessions.initial_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not restore session");
                None
            }
        };
        match session {
            Some(session) => self.adopt(session).await,
            None => {
                self.inner.state.send_replace(AuthState::settled());
            }
        }
    }

    /// Store `user` if `session` still belongs to the held identity.
    fn set_user_for(&self, session: &Session, user: Option<AppUser>) {
        self.inner.state.send_if_modified(|state| {
            let current = state.session.as_ref().map(|s| s.user.id);
            if current != Some(session.user.id) {
                debug!("Session changed while loading profile; discarding result");
                return false;
            }
            state.user = user;
            true
        });
    }

    /// Hold `session`, then load its profile.
    async fn adopt(&self, session: Session) {
        // Expose the session before the profile resolves.
        self.inner
            .state
            .send_modify(|state| state.session = Some(session.clone()));
        let user = self.inner.profiles.load(&session).await;
        self.set_user_for(&session, user);
        self.inner.state.send_modify(|state| state.loading = false);
    }

    async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedOut => {
                self.inner.state.send_replace(AuthState::settled());
            }
            AuthEvent::SignedIn(session) => {
                let held = self
                    .inner
                    .state
                    .borrow()
                    .session
                    .as_ref()
                    .is_some_and(|s| s.access_token == session.access_token);
                if !held {
                    self.adopt(session).await;
                }
            }
            AuthEvent::TokenRefreshed(session) => {
                self.inner.state.send_if_modified(|state| match &state.session {
                    Some(current) if current.user.id == session.user.id => {
                        state.session = Some(session);
                        true
                    }
                    _ => false,
                });
            }
            AuthEvent::InitialSession(session) => {
                if self.inner.state.borrow().session.is_some() {
                    return;
                }
                match session {
                    Some(session) => self.adopt(session).await,
                    None => {
                        self.inner.state.send_modify(|state| state.loading = false);
                    }
                }
            }
        }
    }

    /// Password sign-in.
    ///
    /// The context is only updated when the account has an approved profile.
    /// An unapproved account yields [`LoginOutcome::NeedsApproval`] and its
    /// fresh session is revoked.
    ///
    /// # Errors
    ///
    /// The backend's error unchanged for bad credentials,
    /// [`AuthError::Profile`] when no profile resolves.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let session = self.inner.sessions.sign_in(email, password).await?;

        let Some(user) = self.inner.profiles.load(&session).await else {
            self.inner.sessions.revoke(&session).await;
            return Err(AuthError::Profile);
        };
        if !user.is_approved {
            info!(user_id = %user.id, "Login pending approval");
            self.inner.sessions.revoke(&session).await;
            return Ok(LoginOutcome::NeedsApproval);
        }

        self.inner.state.send_replace(AuthState {
            session: Some(session.clone()),
            user: Some(user),
            loading: false,
        });
        if let Err(e) = self.inner.sessions.commit(session.clone()) {
            self.inner.state.send_replace(AuthState::settled());
            self.inner.sessions.revoke(&session).await;
            return Err(e.into());
        }
        Ok(LoginOutcome::SignedIn)
    }

    /// Create an account pending approval. Never signs the caller in.
    ///
    /// `display_name` defaults to the email's local part.
    ///
    /// # Errors
    ///
    /// Invalid email, or the backend's error unchanged.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let display_name = email.display_name_or_local_part(display_name);

        let session = self
            .inner
            .sessions
            .backend()
            .sign_up(email.as_str(), password, &display_name)
            .await?;
        if let Some(session) = session {
            self.inner.sessions.revoke(&session).await;
        }
        info!(email = %email, "Registered account pending approval");
        Ok(())
    }

    /// Revoke the session and clear local state unconditionally.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.inner.sessions.sign_out().await;
        self.inner.state.send_replace(AuthState::settled());
    }

    /// Re-fetch the profile for the held session and replace it.
    #[instrument(skip(self))]
    pub async fn refresh_user(&self) {
        let held = self.inner.state.borrow().session.clone();
        let Some(session) = held else {
            return;
        };
        let user = self.inner.profiles.load(&session).await;
        self.set_user_for(&session, user);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::session::SESSION_STORAGE_KEY;
    use crate::storage::temp_storage;
    use insight_library_core::Role;

    struct Harness {
        backend: Arc<MemoryBackend>,
        storage: LocalStorage,
        context: AuthContext,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let storage = temp_storage();
        let context = context_on(&backend, &storage);
        Harness {
            backend,
            storage,
            context,
        }
    }

    fn context_on(backend: &Arc<MemoryBackend>, storage: &LocalStorage) -> AuthContext {
        let config = ClientConfig::new(Url::parse("http://localhost:8000").unwrap(), "anon");
        let backend: Arc<dyn AuthBackend> = backend.clone();
        AuthContext::new(backend, storage.clone(), &config)
    }

    #[tokio::test]
    async fn test_login_with_approved_profile_commits() {
        let h = harness();
        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();

        let outcome = h.context.login("reader@studio.test", "secret1").await.unwrap();

        assert_eq!(outcome, LoginOutcome::SignedIn);
        let state = h.context.state();
        assert!(state.is_authenticated());
        assert!(!state.is_moderator());
        assert!(h.storage.get_item(SESSION_STORAGE_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unapproved_login_needs_approval_and_commits_nothing() {
        let h = harness();
        h.backend
            .insert_user("pending@studio.test", "secret1", Role::User, false)
            .unwrap();

        let outcome = h.context.login("pending@studio.test", "secret1").await.unwrap();

        assert_eq!(outcome, LoginOutcome::NeedsApproval);
        let state = h.context.state();
        assert!(state.session.is_none());
        assert!(state.user.is_none());
        assert!(!state.is_authenticated());
        assert!(h.storage.get_item(SESSION_STORAGE_KEY).unwrap().is_none());
        assert_eq!(h.backend.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_bad_credentials_return_backend_error() {
        let h = harness();
        let err = h.context.login("nobody@studio.test", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::Backend(_)));
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn test_missing_profile_is_a_profile_error() {
        let h = harness();
        let user = h
            .backend
            .insert_user("orphan@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.backend.remove_profile(user.id);

        let err = h.context.login("orphan@studio.test", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::Profile));
        assert!(h.context.state().session.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_profile_timeout_is_a_profile_error() {
        let h = harness();
        h.backend
            .insert_user("slow@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.backend.set_profile_delay(Some(Duration::from_secs(10)));

        let err = h.context.login("slow@studio.test", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::Profile));
    }

    #[tokio::test]
    async fn test_register_then_login_needs_approval() {
        let h = harness();
        h.context.register("new@x.com", "secret1", None).await.unwrap();

        assert!(h.context.state().session.is_none());
        assert_eq!(h.backend.live_sessions(), 0);
        let profile = h.backend.find_profile("new@x.com").unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("new"));

        let outcome = h.context.login("new@x.com", "secret1").await.unwrap();
        assert_eq!(outcome, LoginOutcome::NeedsApproval);
    }

    #[tokio::test]
    async fn test_logout_clears_state() {
        let h = harness();
        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();

        h.context.logout().await;

        assert_eq!(h.context.state(), AuthState::settled());
        assert!(h.storage.get_item(SESSION_STORAGE_KEY).unwrap().is_none());
        assert_eq!(h.backend.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_startup_restores_persisted_session() {
        let h = harness();
        h.backend
            .insert_user("mod@studio.test", "secret1", Role::Moderator, true)
            .unwrap();
        h.context.login("mod@studio.test", "secret1").await.unwrap();

        // A second process over the same storage.
        let restarted = context_on(&h.backend, &h.storage);
        assert!(restarted.state().loading);
        let task = restarted.start();
        let state = restarted.wait_until_loaded().await;
        task.abort();

        assert!(state.is_authenticated());
        assert!(state.is_moderator());
        assert!(!state.is_admin());
    }

    #[tokio::test]
    async fn test_startup_without_session_settles_immediately() {
        let h = harness();
        h.context.initialize().await;
        assert_eq!(h.context.state(), AuthState::settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_profile_timeout_still_settles() {
        let h = harness();
        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();
        h.backend.set_profile_delay(Some(Duration::from_secs(30)));

        let restarted = context_on(&h.backend, &h.storage);
        restarted.initialize().await;

        let state = restarted.state();
        assert!(!state.loading);
        assert!(state.session.is_some());
        assert!(state.user.is_none());
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_initial_session_event_is_ignored_when_session_held() {
        let h = harness();
        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();
        let fetches = h.backend.profile_fetches();

        let held = h.context.state().session.unwrap();
        h.context
            .handle_event(AuthEvent::InitialSession(Some(held)))
            .await;

        assert_eq!(h.backend.profile_fetches(), fetches);
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_profile() {
        let h = harness();
        let user = h
            .backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();
        let fetches = h.backend.profile_fetches();

        let refreshed = h.context.sessions().refresh().await.unwrap().unwrap();
        h.context
            .handle_event(AuthEvent::TokenRefreshed(refreshed.clone()))
            .await;

        let state = h.context.state();
        assert_eq!(state.session, Some(refreshed));
        assert_eq!(state.user.map(|u| u.id), Some(user.id));
        assert_eq!(h.backend.profile_fetches(), fetches);
    }

    #[tokio::test]
    async fn test_signed_out_event_clears_state() {
        let h = harness();
        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();

        h.context.handle_event(AuthEvent::SignedOut).await;
        assert!(!h.context.is_authenticated());
        assert!(h.context.user().is_none());
    }

    #[tokio::test]
    async fn test_refresh_user_picks_up_profile_edits() {
        let h = harness();
        let user = h
            .backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();

        h.backend.update_profile(user.id, |profile| {
            profile.display_name = Some("Reader One".to_owned());
        });
        h.context.refresh_user().await;

        assert_eq!(h.context.user().unwrap().name(), "Reader One");
    }

    #[tokio::test]
    async fn test_access_token_requires_a_held_session() {
        let h = harness();
        assert!(h.context.access_token().await.is_none());

        h.backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        h.context.login("reader@studio.test", "secret1").await.unwrap();
        let token = h.context.access_token().await.unwrap();
        assert_eq!(Some(token), h.context.state().session.map(|s| s.access_token));
    }
}
