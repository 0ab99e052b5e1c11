//! Identity backend client speaking the GoTrue REST API (`/auth/v1`).
//!
//! User-scoped calls send the public key plus the caller's token; admin calls
//! send the service-role key as both `apikey` and bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use insight_library_core::UserId;

use super::{IdentityError, IdentityProvider, IdentityUser, NewAccount, error_message};
use crate::config::SupabaseConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GoTrue admin and user API client.
#[derive(Clone)]
pub struct GoTrueClient {
    client: Client,
    base_url: Url,
    anon_key: String,
    service_role_key: SecretString,
}

impl std::fmt::Debug for GoTrueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueClient")
            .field("base_url", &self.base_url.as_str())
            .field("service_role_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: UserMetadata<'a>,
}

#[derive(Serialize)]
struct UserMetadata<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
struct PasswordBody<'a> {
    password: &'a str,
}

#[derive(Serialize)]
struct PasswordGrantBody<'a> {
    email: &'a str,
    password: &'a str,
}

impl GoTrueClient {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> Result<Self, IdentityError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let mut base_url = config.url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    /// Attach the service credential.
    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.service_role_key.expose_secret();
        request.header("apikey", key).bearer_auth(key)
    }

    /// Map a non-success response into [`IdentityError::Rejected`].
    async fn rejected(response: Response) -> IdentityError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(status, message = %message, "Identity backend rejected request");
        IdentityError::Rejected { status, message }
    }

    async fn parse_user(response: Response) -> Result<IdentityUser, IdentityError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    #[instrument(skip_all)]
    async fn user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Self::parse_user(response).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(IdentityError::InvalidToken)
            }
            _ => Err(Self::rejected(response).await),
        }
    }

    #[instrument(skip(self, account), fields(email = %account.email))]
    async fn create_user(&self, account: &NewAccount) -> Result<IdentityUser, IdentityError> {
        let body = CreateUserBody {
            email: account.email.as_str(),
            password: account.password.expose_secret(),
            email_confirm: true,
            user_metadata: UserMetadata {
                display_name: &account.display_name,
            },
        };

        let response = self
            .admin(self.client.post(self.endpoint("auth/v1/admin/users")?))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let user = Self::parse_user(response).await?;
        debug!(user_id = %user.id, "Identity account created");
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: UserId) -> Result<Option<IdentityUser>, IdentityError> {
        let response = self
            .admin(
                self.client
                    .get(self.endpoint(&format!("auth/v1/admin/users/{id}"))?),
            )
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Self::parse_user(response).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::rejected(response).await),
        }
    }

    #[instrument(skip(self, password))]
    async fn set_password(&self, id: UserId, password: &SecretString) -> Result<(), IdentityError> {
        let response = self
            .admin(
                self.client
                    .put(self.endpoint(&format!("auth/v1/admin/users/{id}"))?),
            )
            .json(&PasswordBody {
                password: password.expose_secret(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: UserId) -> Result<(), IdentityError> {
        let response = self
            .admin(
                self.client
                    .delete(self.endpoint(&format!("auth/v1/admin/users/{id}"))?),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn verify_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<bool, IdentityError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&PasswordGrantBody {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await?;

        match response.status() {
            // The issued session is discarded; it simply expires.
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(false),
            _ => Err(Self::rejected(response).await),
        }
    }
}
