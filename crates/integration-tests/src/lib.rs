//! Integration tests for Insight Library.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p insight-library-integration-tests
//! ```
//!
//! No database or identity server is needed. [`TestServer`] serves the real
//! functions router over the in-memory backends on an ephemeral port, and
//! [`ServiceBackend`] lets the client sign in against those same backends,
//! so the tokens the client holds are the tokens the router authenticates.
//!
//! # Test Categories
//!
//! - `accounts` - Client admin operations end to end
//! - `auth_flow` - Login, registration, approval and session lifecycle
//! - `authorization` - Server-side checks with the client bypassed

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use tokio::task::JoinHandle;
use url::Url;

use insight_library_client::backend::{AuthBackend, BackendError, Session, SessionUser};
use insight_library_client::{ClientConfig, InsightClient};
use insight_library_core::{AppUser, Email, Role, UserId};
use insight_library_functions::db::{NewProfile, ProfileStore};
use insight_library_functions::identity::{IdentityError, IdentityProvider, NewAccount};
use insight_library_functions::memory::MemoryBackends;
use insight_library_functions::{app, state::AppState};

/// Site URL the test service embeds in credentials.
pub const SITE_URL: &str = "https://insight.test/";

/// Anonymous key the client sends; the test service ignores it.
pub const ANON_KEY: &str = "test-anon-key";

fn invalid_credentials() -> BackendError {
    BackendError::Rejected {
        status: 400,
        message: "Invalid login credentials".to_owned(),
    }
}

fn from_identity(err: IdentityError) -> BackendError {
    match err {
        IdentityError::Rejected { status, message } => BackendError::Rejected { status, message },
        IdentityError::InvalidToken => BackendError::Rejected {
            status: 401,
            message: "invalid JWT".to_owned(),
        },
        other => BackendError::InvalidResponse(other.to_string()),
    }
}

/// Client auth backend over the service's in-memory identity and profiles.
#[derive(Debug)]
pub struct ServiceBackend {
    backends: MemoryBackends,
    refresh_tokens: Mutex<HashMap<String, (UserId, String)>>,
}

impl ServiceBackend {
    #[must_use]
    pub fn new(backends: MemoryBackends) -> Self {
        Self {
            backends,
            refresh_tokens: Mutex::new(HashMap::new()),
        }
    }

    fn issue(&self, id: UserId, email: &str) -> Session {
        let access_token = self.backends.identity.issue_token(id);
        let refresh_token = format!("refresh-{}", uuid::Uuid::new_v4());
        self.refresh_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(refresh_token.clone(), (id, access_token.clone()));
        Session {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::hours(1),
            user: SessionUser {
                id,
                email: email.to_owned(),
            },
        }
    }

    async fn find_profile(&self, email: &str) -> Result<Option<AppUser>, BackendError> {
        let users = self
            .backends
            .profiles
            .list(false)
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(users.into_iter().find(|user| user.email.matches(email)))
    }
}

#[async_trait]
impl AuthBackend for ServiceBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let user = self
            .find_profile(email)
            .await?
            .ok_or_else(invalid_credentials)?;
        let verified = self
            .backends
            .identity
            .verify_password(email, &SecretString::from(password.to_owned()))
            .await
            .map_err(from_identity)?;
        if !verified {
            return Err(invalid_credentials());
        }
        Ok(self.issue(user.id, user.email.as_str()))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError> {
        let email = Email::parse(email).map_err(|e| BackendError::Rejected {
            status: 422,
            message: e.to_string(),
        })?;
        let created = self
            .backends
            .identity
            .create_user(&NewAccount {
                email: email.clone(),
                password: SecretString::from(password.to_owned()),
                display_name: display_name.to_owned(),
            })
            .await
            .map_err(from_identity)?;
        self.backends
            .profiles
            .provision(&NewProfile {
                id: created.id,
                email: email.clone(),
                display_name: display_name.to_owned(),
                role: Role::User,
                is_approved: false,
            })
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(Some(self.issue(created.id, email.as_str())))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.backends
            .identity
            .user_from_token(access_token)
            .await
            .map_err(from_identity)?;
        self.backends.identity.revoke_token(access_token);
        self.refresh_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, (_, paired)| paired != access_token);
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let entry = self
            .refresh_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(refresh_token);
        let Some((id, old_access)) = entry else {
            return Err(BackendError::Rejected {
                status: 400,
                message: "Invalid Refresh Token".to_owned(),
            });
        };
        self.backends.identity.revoke_token(&old_access);
        let user = self
            .backends
            .identity
            .get_user(id)
            .await
            .map_err(from_identity)?
            .ok_or_else(invalid_credentials)?;
        Ok(self.issue(id, &user.email))
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Option<AppUser>, BackendError> {
        self.backends
            .identity
            .user_from_token(access_token)
            .await
            .map_err(from_identity)?;
        self.backends
            .profiles
            .get(user_id)
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// The functions router served over in-memory backends.
pub struct TestServer {
    pub backends: MemoryBackends,
    pub base_url: Url,
    auth: Arc<ServiceBackend>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    #[allow(clippy::expect_used)]
    pub async fn spawn() -> Self {
        let backends = MemoryBackends::new();
        let router = app(AppState::new(backends.account_service(SITE_URL)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Test server failed");
        });

        let base_url = Url::parse(&format!("http://{addr}/")).expect("Invalid test server URL");
        Self {
            auth: Arc::new(ServiceBackend::new(backends.clone())),
            backends,
            base_url,
            handle,
        }
    }

    /// A fresh client with its own storage directory.
    #[must_use]
    pub fn client(&self) -> InsightClient {
        self.client_in(temp_storage_dir())
    }

    /// A client over `storage_dir`; clients sharing a directory share the
    /// persisted session.
    ///
    /// # Panics
    ///
    /// Panics if the storage directory cannot be created.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn client_in(&self, storage_dir: PathBuf) -> InsightClient {
        let config =
            ClientConfig::new(self.base_url.clone(), ANON_KEY).with_storage_dir(storage_dir);
        InsightClient::with_backend(&config, Arc::clone(&self.auth) as Arc<dyn AuthBackend>)
            .expect("Failed to build client")
    }

    /// Seed an approved account with a profile.
    #[must_use]
    pub fn seed(&self, email: &str, password: &str, role: Role) -> AppUser {
        self.backends.seed_user(email, password, role, true).0
    }

    /// Full URL of a functions endpoint, for requests that bypass the client.
    ///
    /// # Panics
    ///
    /// Panics if `name` does not form a valid URL.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Url {
        self.base_url
            .join("functions/v1/")
            .and_then(|base| base.join(name))
            .expect("Invalid endpoint")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A unique, not yet created directory under the system temp dir.
#[must_use]
pub fn temp_storage_dir() -> PathBuf {
    std::env::temp_dir().join(format!("insight-it-{}", uuid::Uuid::new_v4()))
}
