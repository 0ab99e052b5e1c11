//! Caller authentication for function routes.
//!
//! Every privileged route takes an [`AuthenticatedCaller`]. The extractor
//! re-derives the caller from the bearer token on each request and reloads
//! their profile, so a role change or deletion takes effect immediately.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{FunctionError, set_sentry_user};
use crate::services::accounts::Caller;
use crate::state::AppState;

/// Extractor that requires a valid user access token.
///
/// Rejects with 401 `Missing authorization header` when no token is sent and
/// 401 `Invalid user token` when the identity backend does not recognize it.
///
/// ```rust,ignore
/// async fn handler(AuthenticatedCaller(caller): AuthenticatedCaller) -> String {
///     caller.identity.email
/// }
/// ```
pub struct AuthenticatedCaller(pub Caller);

impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = FunctionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(FunctionError::MissingAuth)?;

        let caller = state.accounts().authenticate(token).await?;
        set_sentry_user(caller.identity.id, Some(&caller.identity.email));

        Ok(Self(caller))
    }
}

/// Token from an `Authorization: Bearer <token>` value. The scheme name is
/// case-insensitive; any other scheme, or a bare token, yields `None`.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
