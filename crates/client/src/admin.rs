//! User management client for the functions service.
//!
//! Every operation applies the same policy the server enforces before any
//! request is made, so a forbidden action fails fast with
//! [`AdminClientError::Policy`]. The server re-checks everything; its
//! `{ "error": message }` bodies surface as [`AdminClientError::Server`].

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use insight_library_core::{
    ActivityLog, ActivityLogQuery, AppUser, Email, MAX_DISPLAY_NAME_LENGTH, MIN_PASSWORD_LENGTH,
    PolicyViolation, Role, UserCredentials, UserId, policy,
};

use crate::backend::error_message;
use crate::config::ClientConfig;
use crate::context::AuthContext;
use crate::error::AdminClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of inviting a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub message: String,
    #[serde(default)]
    pub email_sent: bool,
    pub credentials: UserCredentials,
}

/// One page of audit entries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogPage {
    pub logs: Vec<ActivityLog>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Deserialize)]
struct CredentialsBody {
    credentials: UserCredentials,
}

#[derive(Deserialize)]
struct UserBody {
    user: AppUser,
}

#[derive(Deserialize)]
struct UsersBody {
    users: Vec<AppUser>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody {
    user_id: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleBody {
    user_id: UserId,
    role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody<'a> {
    user_id: UserId,
    confirm_email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Admin operations on behalf of the signed-in user.
#[derive(Clone)]
pub struct UserAdmin {
    client: Client,
    functions_url: Url,
    anon_key: String,
    auth: AuthContext,
}

impl std::fmt::Debug for UserAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAdmin")
            .field("functions_url", &self.functions_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UserAdmin {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, auth: AuthContext) -> Result<Self, AdminClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            functions_url: config.functions_url.clone(),
            anon_key: config.anon_key.clone(),
            auth,
        })
    }

    fn actor(&self) -> Result<AppUser, AdminClientError> {
        self.auth.user().ok_or(AdminClientError::NotSignedIn)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, AdminClientError> {
        let token = self
            .auth
            .access_token()
            .await
            .ok_or(AdminClientError::NotSignedIn)?;
        Ok(request.header("apikey", &self.anon_key).bearer_auth(token))
    }

    fn endpoint(&self, name: &str) -> Result<Url, AdminClientError> {
        self.functions_url
            .join(name)
            .map_err(|e| AdminClientError::InvalidResponse(format!("bad endpoint {name}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, AdminClientError> {
        let request = self.authorized(self.client.get(url)).await?;
        Self::handle_response(request.send().await?).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<T, AdminClientError> {
        let request = self
            .authorized(self.client.post(self.endpoint(name)?))
            .await?;
        Self::handle_response(request.json(body).send().await?).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, AdminClientError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| AdminClientError::InvalidResponse(e.to_string()));
        }
        let message = error_message(&body);
        debug!(status = status.as_u16(), message = %message, "Functions request refused");
        Err(AdminClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    /// Create a pre-approved account and return its one-shot credentials.
    ///
    /// # Errors
    ///
    /// Locally: invalid email, non-admin actor, or a regular admin granting
    /// `admin`. Otherwise whatever the server answered.
    #[instrument(skip(self))]
    pub async fn invite_user(
        &self,
        email: &str,
        display_name: Option<&str>,
        role: Role,
    ) -> Result<Invitation, AdminClientError> {
        let actor = self.actor()?;
        let email = Email::parse(email)?;
        policy::check_role_assignment(&actor, role)?;

        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());
        self.post(
            "invite-user",
            &InviteBody {
                email: email.as_str(),
                display_name,
                role,
            },
        )
        .await
    }

    /// Overwrite `target`'s password and return the new credentials.
    ///
    /// # Errors
    ///
    /// Locally when `target` is not manageable by the actor.
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn reset_password(&self, target: &AppUser) -> Result<UserCredentials, AdminClientError> {
        let actor = self.actor()?;
        policy::check_manage(&actor, target.id, target.role)?;

        let body: CredentialsBody = self
            .post("reset-password", &TargetBody { user_id: target.id })
            .await?;
        Ok(body.credentials)
    }

    /// Set `target`'s role.
    ///
    /// # Errors
    ///
    /// Locally when the actor may not manage `target` or may not grant `role`.
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn update_role(&self, target: &AppUser, role: Role) -> Result<AppUser, AdminClientError> {
        let actor = self.actor()?;
        policy::check_role_change(&actor, target, role)?;

        let body: UserBody = self
            .post(
                "update-role",
                &RoleBody {
                    user_id: target.id,
                    role,
                },
            )
            .await?;
        Ok(body.user)
    }

    /// Approve a pending account.
    ///
    /// # Errors
    ///
    /// Locally when `target` is not manageable by the actor.
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn approve_user(&self, target: &AppUser) -> Result<AppUser, AdminClientError> {
        let actor = self.actor()?;
        policy::check_manage(&actor, target.id, target.role)?;

        let body: UserBody = self
            .post("approve-user", &TargetBody { user_id: target.id })
            .await?;
        Ok(body.user)
    }

    /// Delete `target`. `confirm_email` must repeat the target's address.
    ///
    /// # Errors
    ///
    /// Locally when `target` is not manageable or the confirmation differs.
    #[instrument(skip(self, target, confirm_email), fields(target_id = %target.id))]
    pub async fn delete_user(
        &self,
        target: &AppUser,
        confirm_email: &str,
    ) -> Result<(), AdminClientError> {
        let actor = self.actor()?;
        policy::check_manage(&actor, target.id, target.role)?;
        if !target.email.matches(confirm_email) {
            return Err(AdminClientError::Validation(
                "Confirmation email does not match".to_string(),
            ));
        }

        let _: IgnoredAny = self
            .post(
                "delete-user",
                &DeleteBody {
                    user_id: target.id,
                    confirm_email,
                },
            )
            .await?;
        Ok(())
    }

    /// Change a display name. `target` of `None` (or the actor's own
    /// profile) edits the actor; anyone else requires management rights.
    ///
    /// The auth context is refreshed after a self-edit.
    ///
    /// # Errors
    ///
    /// Locally when the name is too long or the target is not manageable.
    #[instrument(skip(self, target))]
    pub async fn update_profile(
        &self,
        target: Option<&AppUser>,
        display_name: &str,
    ) -> Result<AppUser, AdminClientError> {
        let actor = self.actor()?;
        let other = target.filter(|target| target.id != actor.id);
        if let Some(target) = other {
            policy::check_manage(&actor, target.id, target.role)?;
        }
        if display_name.trim().chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(AdminClientError::Validation(format!(
                "Display name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
            )));
        }

        let body: UserBody = self
            .post(
                "update-profile",
                &ProfileBody {
                    user_id: other.map(|target| target.id),
                    display_name,
                },
            )
            .await?;
        if other.is_none() {
            self.auth.refresh_user().await;
        }
        Ok(body.user)
    }

    /// Change the actor's own password.
    ///
    /// # Errors
    ///
    /// Locally when the current password is blank, the confirmation differs
    /// or the new password is too short.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AdminClientError> {
        self.actor()?;
        if current_password.is_empty() {
            return Err(AdminClientError::Validation(
                "Current password is required".to_string(),
            ));
        }
        if new_password != confirm_password {
            return Err(AdminClientError::Validation(
                "New passwords do not match".to_string(),
            ));
        }
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AdminClientError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let _: IgnoredAny = self
            .post(
                "change-password",
                &PasswordBody {
                    current_password,
                    new_password,
                },
            )
            .await?;
        Ok(())
    }

    /// Profiles for the management view, newest first.
    ///
    /// # Errors
    ///
    /// Locally for regular users.
    #[instrument(skip(self))]
    pub async fn list_users(&self, pending_only: bool) -> Result<Vec<AppUser>, AdminClientError> {
        let actor = self.actor()?;
        policy::check_view_users(&actor)?;

        let mut url = self.endpoint("users")?;
        if pending_only {
            url.query_pairs_mut().append_pair("pending", "true");
        }
        let body: UsersBody = self.get(url).await?;
        Ok(body.users)
    }

    /// One page of the audit log.
    ///
    /// # Errors
    ///
    /// Locally for non-admins.
    #[instrument(skip(self))]
    pub async fn activity_logs(
        &self,
        query: &ActivityLogQuery,
    ) -> Result<ActivityLogPage, AdminClientError> {
        let actor = self.actor()?;
        if !actor.is_admin() {
            return Err(PolicyViolation::NotAdmin.into());
        }

        let mut url = self.endpoint("activity-logs")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(action) = query.action {
                pairs.append_pair("action", action.as_str());
            }
            if let Some(search) = query.search_term() {
                pairs.append_pair("search", &search);
            }
            pairs
                .append_pair("page", &query.page.to_string())
                .append_pair("pageSize", &query.limit().to_string());
        }
        self.get(url).await
    }
}
