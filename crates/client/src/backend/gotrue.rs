//! HTTP backend: GoTrue auth endpoints (`/auth/v1`) and the table API
//! (`/rest/v1`), both called with the public key.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use insight_library_core::{AppUser, UserId};

use super::{AuthBackend, BackendError, Session, SessionUser, error_message};
use crate::config::ClientConfig;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Backend client over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    display_name: &'a str,
}

/// Token endpoint payload. Sign-up answers with this shape when the backend
/// auto-confirms, and with a bare user object otherwise.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SessionUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in.unwrap_or(3600)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

impl HttpBackend {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    fn token_endpoint(&self, grant_type: &str) -> Result<Url, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }

    fn public(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.anon_key)
    }

    /// Return the response on success, otherwise map it to [`BackendError::Rejected`].
    async fn handle_response(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(status = status.as_u16(), message = %message, "Backend rejected request");
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .public(self.client.post(self.token_endpoint("password")?))
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        let tokens: TokenResponse = Self::parse(Self::handle_response(response).await?).await?;
        Ok(tokens.into_session(Utc::now()))
    }

    #[instrument(skip(self, password))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError> {
        let response = self
            .public(self.client.post(self.endpoint("auth/v1/signup")?))
            .json(&SignUpBody {
                email,
                password,
                data: SignUpMetadata { display_name },
            })
            .send()
            .await?;
        let body: serde_json::Value = Self::parse(Self::handle_response(response).await?).await?;

        if body.get("access_token").is_none() {
            debug!("Sign-up returned no session");
            return Ok(None);
        }
        let tokens: TokenResponse = serde_json::from_value(body)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(Some(tokens.into_session(Utc::now())))
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .public(self.client.post(self.endpoint("auth/v1/logout")?))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::handle_response(response).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let response = self
            .public(self.client.post(self.token_endpoint("refresh_token")?))
            .json(&RefreshGrant { refresh_token })
            .send()
            .await?;
        let tokens: TokenResponse = Self::parse(Self::handle_response(response).await?).await?;
        Ok(tokens.into_session(Utc::now()))
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Option<AppUser>, BackendError> {
        let mut url = self.endpoint("rest/v1/users")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{user_id}"))
            .append_pair("select", "*");

        let response = self
            .public(self.client.get(url))
            .bearer_auth(access_token)
            .send()
            .await?;
        let rows: Vec<AppUser> = Self::parse(Self::handle_response(response).await?).await?;
        Ok(rows.into_iter().next())
    }
}
