//! In-memory [`AuthBackend`] for tests and local development.
//!
//! Sign-up behaves like an auto-confirming backend: it issues a session and
//! creates an unapproved `user` profile. Profile fetches can be delayed or
//! failed to exercise the loader's timeout and degradation paths.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use insight_library_core::{AppUser, Email, EmailError, Role, UserId};

use super::{AuthBackend, BackendError, Session, SessionUser};

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    email: String,
    password: String,
}

#[derive(Debug)]
struct State {
    accounts: Vec<Account>,
    profiles: HashMap<UserId, AppUser>,
    access_tokens: HashMap<String, UserId>,
    /// Refresh token to (owner, paired access token).
    refresh_tokens: HashMap<String, (UserId, String)>,
    session_ttl: Duration,
    profile_delay: Option<StdDuration>,
    fail_profiles: bool,
    fail_refresh: bool,
    profile_fetches: usize,
    sign_outs: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            profiles: HashMap::new(),
            access_tokens: HashMap::new(),
            refresh_tokens: HashMap::new(),
            session_ttl: Duration::hours(1),
            profile_delay: None,
            fail_profiles: false,
            fail_refresh: false,
            profile_fetches: 0,
            sign_outs: 0,
        }
    }
}

/// Backend state held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

fn rejected(status: u16, message: &str) -> BackendError {
    BackendError::Rejected {
        status,
        message: message.to_owned(),
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an account with a profile row.
    ///
    /// # Errors
    ///
    /// Returns an error if `email` is not a valid address.
    pub fn insert_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
        is_approved: bool,
    ) -> Result<AppUser, EmailError> {
        let parsed = Email::parse(email)?;
        let profile = AppUser {
            id: UserId::random(),
            email: parsed.clone(),
            display_name: None,
            avatar_url: None,
            role,
            is_approved,
            created_at: Utc::now(),
        };
        let mut state = self.lock();
        state.accounts.push(Account {
            id: profile.id,
            email: parsed.as_str().to_owned(),
            password: password.to_owned(),
        });
        state.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    /// Drop a profile row, leaving the account able to sign in.
    pub fn remove_profile(&self, id: UserId) {
        self.lock().profiles.remove(&id);
    }

    /// Apply `f` to a stored profile. No-op when there is none.
    pub fn update_profile(&self, id: UserId, f: impl FnOnce(&mut AppUser)) {
        if let Some(profile) = self.lock().profiles.get_mut(&id) {
            f(profile);
        }
    }

    #[must_use]
    pub fn profile(&self, id: UserId) -> Option<AppUser> {
        self.lock().profiles.get(&id).cloned()
    }

    #[must_use]
    pub fn find_profile(&self, email: &str) -> Option<AppUser> {
        self.lock()
            .profiles
            .values()
            .find(|profile| profile.email.matches(email))
            .cloned()
    }

    /// Lifetime of sessions issued from now on.
    pub fn set_session_ttl(&self, ttl: Duration) {
        self.lock().session_ttl = ttl;
    }

    /// Delay every profile fetch by `delay`.
    pub fn set_profile_delay(&self, delay: Option<StdDuration>) {
        self.lock().profile_delay = delay;
    }

    /// Make profile fetches fail.
    pub fn fail_profile_fetches(&self, fail: bool) {
        self.lock().fail_profiles = fail;
    }

    /// Make token refreshes fail.
    pub fn fail_refreshes(&self, fail: bool) {
        self.lock().fail_refresh = fail;
    }

    #[must_use]
    pub fn profile_fetches(&self) -> usize {
        self.lock().profile_fetches
    }

    #[must_use]
    pub fn sign_outs(&self) -> usize {
        self.lock().sign_outs
    }

    /// Access tokens that have not been revoked or rotated.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.lock().access_tokens.len()
    }

    fn issue(state: &mut State, account: &Account) -> Session {
        let access_token = format!("access-{}", Uuid::new_v4());
        let refresh_token = format!("refresh-{}", Uuid::new_v4());
        state.access_tokens.insert(access_token.clone(), account.id);
        state
            .refresh_tokens
            .insert(refresh_token.clone(), (account.id, access_token.clone()));
        Session {
            access_token,
            refresh_token,
            expires_at: Utc::now() + state.session_ttl,
            user: SessionUser {
                id: account.id,
                email: account.email.clone(),
            },
        }
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let mut state = self.lock();
        let account = state
            .accounts
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(email.trim()))
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(|| rejected(400, INVALID_CREDENTIALS))?;
        Ok(Self::issue(&mut state, &account))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError> {
        let parsed = Email::parse(email).map_err(|e| rejected(400, &e.to_string()))?;
        let mut state = self.lock();
        if state
            .accounts
            .iter()
            .any(|account| account.email.eq_ignore_ascii_case(parsed.as_str()))
        {
            return Err(rejected(422, "User already registered"));
        }

        let account = Account {
            id: UserId::random(),
            email: parsed.as_str().to_owned(),
            password: password.to_owned(),
        };
        state.profiles.insert(
            account.id,
            AppUser {
                id: account.id,
                email: parsed,
                display_name: Some(display_name.to_owned()),
                avatar_url: None,
                role: Role::User,
                is_approved: false,
                created_at: Utc::now(),
            },
        );
        state.accounts.push(account.clone());
        Ok(Some(Self::issue(&mut state, &account)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.sign_outs += 1;
        let user_id = state
            .access_tokens
            .remove(access_token)
            .ok_or_else(|| rejected(401, "invalid JWT"))?;
        // Global scope: every session of the user ends.
        state.access_tokens.retain(|_, id| *id != user_id);
        state.refresh_tokens.retain(|_, (id, _)| *id != user_id);
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut state = self.lock();
        if state.fail_refresh {
            return Err(rejected(400, "Invalid Refresh Token: Refresh Token Not Found"));
        }
        let (user_id, paired_access) = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| rejected(400, "Invalid Refresh Token: Refresh Token Not Found"))?;
        let account = state
            .accounts
            .iter()
            .find(|account| account.id == user_id)
            .cloned()
            .ok_or_else(|| rejected(404, "User not found"))?;
        state.access_tokens.remove(&paired_access);
        Ok(Self::issue(&mut state, &account))
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Option<AppUser>, BackendError> {
        let delay = {
            let mut state = self.lock();
            state.profile_fetches += 1;
            if !state.access_tokens.contains_key(access_token) {
                return Err(rejected(401, "invalid JWT"));
            }
            state.profile_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if state.fail_profiles {
            return Err(rejected(503, "upstream connect error"));
        }
        Ok(state.profiles.get(&user_id).cloned())
    }
}
