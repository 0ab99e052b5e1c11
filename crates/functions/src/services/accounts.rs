//! Privileged account operations.
//!
//! Every operation follows the same sequence:
//!
//! 1. the caller has already been re-derived from their bearer token
//!    ([`AccountService::authenticate`])
//! 2. the caller's role is re-checked against their own profile row
//! 3. the request body is validated
//! 4. the identity backend and/or profile row is mutated
//! 5. one audit entry is written, and the affected user is notified when
//!    someone else changed their account
//!
//! Steps after the mutation are best effort: a failed welcome email, audit
//! write or notification is logged (and sent to Sentry) but never fails the
//! request, and nothing is rolled back.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

use insight_library_core::{
    ActivityAction, ActivityLog, ActivityLogQuery, AppUser, Email, EmailError, NewActivityLog,
    NewNotification, Notification, NotificationId, PolicyViolation, Role, UserCredentials, UserId,
    MIN_PASSWORD_LENGTH, NOTIFICATION_LIST_LIMIT, policy,
};

use super::email::WelcomeMailer;
use super::password::generate_password;
use crate::db::{ActivityLogStore, NewProfile, NotificationStore, ProfileStore, RepositoryError};
use crate::identity::{IdentityError, IdentityProvider, IdentityUser, NewAccount};

pub use insight_library_core::MAX_DISPLAY_NAME_LENGTH;

pub const ONLY_ADMINS_CREATE: &str = "Only admins can create users";
pub const ONLY_ADMINS_RESET: &str = "Only admins can reset passwords";
pub const ONLY_ADMINS_MANAGE: &str = "Only admins can manage users";
pub const ONLY_ADMINS_LOGS: &str = "Only admins can view activity logs";
const USER_NOT_FOUND: &str = "User not found";
const USER_ID_REQUIRED: &str = "User ID is required";
const NOTIFICATION_NOT_FOUND: &str = "Notification not found";

/// Errors from account operations, already classified for the HTTP boundary.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The bearer token did not resolve to an account.
    #[error("Invalid user token")]
    InvalidToken,

    /// The caller's role does not allow the operation.
    #[error("{0}")]
    Forbidden(String),

    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The management target does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The identity backend refused the mutation; message is the backend's.
    #[error("{0}")]
    Upstream(String),

    /// The identity backend failed unexpectedly.
    #[error("identity backend error: {0}")]
    Identity(IdentityError),

    /// Profile or audit storage failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<IdentityError> for AccountError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken => Self::InvalidToken,
            IdentityError::Rejected { message, .. } => Self::Upstream(message),
            other => Self::Identity(other),
        }
    }
}

impl From<PolicyViolation> for AccountError {
    fn from(violation: PolicyViolation) -> Self {
        Self::Forbidden(violation.to_string())
    }
}

impl From<EmailError> for AccountError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

// =============================================================================
// Request bodies
// =============================================================================

// Every field is optional at the serde level so that role checks run before
// body validation: a non-admin with an empty body still gets 403.

/// `invite-user` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Body naming a single target account (`reset-password`, `approve-user`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `update-role` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// `delete-user` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub confirm_email: Option<String>,
}

/// `update-profile` body. Without `userId` the caller edits their own profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// `change-password` body.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

/// Body naming one of the caller's notifications. `mark-notifications-read`
/// marks everything when the id is absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub notification_id: Option<String>,
}

impl std::fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("current_password", &"[REDACTED]")
            .field("new_password", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Results
// =============================================================================

/// The authenticated caller of a privileged operation.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: IdentityUser,
    /// The caller's own profile row, read server-side. `None` when missing.
    pub profile: Option<AppUser>,
}

impl Caller {
    /// The caller's profile, if it carries the `admin` role.
    ///
    /// # Errors
    ///
    /// [`AccountError::Forbidden`] with `denied` as the message otherwise.
    pub fn require_admin(&self, denied: &str) -> Result<&AppUser, AccountError> {
        self.profile
            .as_ref()
            .filter(|profile| profile.is_admin())
            .ok_or_else(|| AccountError::Forbidden(denied.to_owned()))
    }

    /// Audit entry attributed to this caller.
    fn activity(&self, action: ActivityAction) -> NewActivityLog {
        self.profile.as_ref().map_or_else(
            || {
                NewActivityLog::new(
                    self.identity.id,
                    self.identity.email.as_str(),
                    Role::User,
                    action,
                )
            },
            |profile| NewActivityLog::by(profile, action),
        )
    }
}

/// Outcome of creating an account.
#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub user_id: UserId,
    pub credentials: UserCredentials,
    pub email_sent: bool,
    /// `false` when the account exists but its profile row could not be written.
    pub profile_provisioned: bool,
}

impl ProvisionedAccount {
    /// Confirmation message shown to the admin.
    #[must_use]
    pub fn message(&self) -> String {
        if self.email_sent {
            "User created successfully and welcome email sent".to_owned()
        } else {
            "User created successfully".to_owned()
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// The caller's most recent notifications.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// Orchestrates privileged account operations over the backend seams.
#[derive(Clone)]
pub struct AccountService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    activity: Arc<dyn ActivityLogStore>,
    notifications: Arc<dyn NotificationStore>,
    mailer: Option<Arc<dyn WelcomeMailer>>,
    site_url: String,
}

impl AccountService {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        activity: Arc<dyn ActivityLogStore>,
        notifications: Arc<dyn NotificationStore>,
        mailer: Option<Arc<dyn WelcomeMailer>>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            profiles,
            activity,
            notifications,
            mailer,
            site_url: site_url.into(),
        }
    }

    /// Public site URL embedded in credentials.
    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Round-trip to profile storage.
    ///
    /// # Errors
    ///
    /// Returns the storage error when the backing store is unreachable.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.profiles.ping().await
    }

    /// Re-derive the caller from a bearer token and load their profile.
    ///
    /// # Errors
    ///
    /// [`AccountError::InvalidToken`] when the backend does not recognize the token.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, access_token: &str) -> Result<Caller, AccountError> {
        let identity = self.identity.user_from_token(access_token).await?;
        let profile = self.profiles.get(identity.id).await?;
        Ok(Caller { identity, profile })
    }

    /// Create a pre-approved account with a generated password.
    ///
    /// # Errors
    ///
    /// 403 unless the caller is an admin (and the super-admin when granting
    /// `admin`), 400 for a missing email or a backend refusal.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn create_user(
        &self,
        caller: &Caller,
        request: CreateUserRequest,
    ) -> Result<ProvisionedAccount, AccountError> {
        let actor = caller.require_admin(ONLY_ADMINS_CREATE)?;
        let email = required_email(request.email.as_deref())?;
        let role = optional_role(request.role.as_deref())?.unwrap_or_default();
        policy::check_role_assignment(actor, role)?;

        let account = self
            .provision_account(&email, request.display_name.as_deref(), role)
            .await?;

        let entry = caller
            .activity(ActivityAction::UserCreate)
            .target(account.user_id, email.as_str())
            .details(json!({
                "displayName": account.credentials.display_name,
                "role": role,
                "emailSent": account.email_sent,
                "profileProvisioned": account.profile_provisioned,
            }));
        self.record(entry).await;

        Ok(account)
    }

    /// Create a pre-approved account without an acting admin.
    ///
    /// Used by operator tooling to bootstrap the first accounts. No audit
    /// entry is written since there is no actor.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Upstream`] when the backend refuses the account.
    #[instrument(skip(self, display_name), fields(email = %email, role = %role))]
    pub async fn provision_account(
        &self,
        email: &Email,
        display_name: Option<&str>,
        role: Role,
    ) -> Result<ProvisionedAccount, AccountError> {
        let password = generate_password();
        let display_name = email.display_name_or_local_part(display_name);

        let created = self
            .identity
            .create_user(&NewAccount {
                email: email.clone(),
                password: SecretString::from(password.clone()),
                display_name: display_name.clone(),
            })
            .await?;

        let profile = NewProfile {
            id: created.id,
            email: email.clone(),
            display_name: display_name.clone(),
            role,
            is_approved: true,
        };
        // The account exists either way; a missing profile is fixed up from the admin UI.
        let profile_provisioned = match self.profiles.provision(&profile).await {
            Ok(_) => true,
            Err(e) => {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    error = %e,
                    user_id = %created.id,
                    sentry_event_id = %event_id,
                    "Failed to provision profile for new account"
                );
                false
            }
        };

        let credentials = UserCredentials {
            email: email.to_string(),
            password,
            display_name: Some(display_name),
            role: Some(role),
            site_url: self.site_url.clone(),
        };

        let email_sent = match &self.mailer {
            Some(mailer) => match mailer.send_welcome(&credentials).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, user_id = %created.id, "Failed to send welcome email");
                    false
                }
            },
            None => false,
        };

        info!(user_id = %created.id, email_sent, profile_provisioned, "Account provisioned");
        Ok(ProvisionedAccount {
            user_id: created.id,
            credentials,
            email_sent,
            profile_provisioned,
        })
    }

    /// Overwrite a user's password with a generated one.
    ///
    /// # Errors
    ///
    /// 403 unless the caller is an admin who may manage the target, 400 without
    /// a user id, 404 for an unknown account.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn reset_password(
        &self,
        caller: &Caller,
        request: TargetRequest,
    ) -> Result<UserCredentials, AccountError> {
        let actor = caller.require_admin(ONLY_ADMINS_RESET)?;
        let target_id = required_user_id(request.user_id.as_deref())?;
        let target = self
            .identity
            .get_user(target_id)
            .await?
            .ok_or_else(|| AccountError::NotFound(USER_NOT_FOUND.to_owned()))?;

        // Accounts without a profile row are managed as plain users.
        let target_role = self
            .profiles
            .get(target_id)
            .await?
            .map_or(Role::User, |profile| profile.role);
        policy::check_manage(actor, target_id, target_role)?;

        let password = generate_password();
        self.identity
            .set_password(target_id, &SecretString::from(password.clone()))
            .await?;

        let entry = caller
            .activity(ActivityAction::PasswordReset)
            .target(target_id, target.email.as_str());
        self.record(entry).await;

        info!(target = %target_id, "Password reset");
        Ok(UserCredentials {
            email: target.email,
            password,
            display_name: None,
            role: None,
            site_url: self.site_url.clone(),
        })
    }

    /// Change another user's role.
    ///
    /// Setting the role the target already has is a no-op: nothing is audited
    /// and the target is not notified.
    ///
    /// # Errors
    ///
    /// 403 when the role-change policy refuses, 400 for a missing or unknown
    /// role, 404 for an unknown target.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn update_role(
        &self,
        caller: &Caller,
        request: UpdateRoleRequest,
    ) -> Result<AppUser, AccountError> {
        let actor = caller.require_admin(ONLY_ADMINS_MANAGE)?;
        let target_id = required_user_id(request.user_id.as_deref())?;
        let new_role = optional_role(request.role.as_deref())?
            .ok_or_else(|| AccountError::Validation("Role is required".to_owned()))?;
        let target = self.target_profile(target_id).await?;
        policy::check_role_change(actor, &target, new_role)?;

        if target.role == new_role {
            return Ok(target);
        }

        let updated = self.profiles.update_role(target_id, new_role).await?;

        let entry = caller
            .activity(ActivityAction::RoleChange)
            .target(target_id, target.email.as_str())
            .details(json!({ "oldRole": target.role, "newRole": new_role }));
        self.record(entry).await;
        self.notify(NewNotification::role_changed(
            target_id,
            target.role,
            new_role,
            &caller.identity.email,
        ))
        .await;

        Ok(updated)
    }

    /// Approve a pending account.
    ///
    /// # Errors
    ///
    /// 403 unless the caller may manage the target, 404 for an unknown target.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn approve_user(
        &self,
        caller: &Caller,
        request: TargetRequest,
    ) -> Result<AppUser, AccountError> {
        let actor = caller.require_admin(ONLY_ADMINS_MANAGE)?;
        let target_id = required_user_id(request.user_id.as_deref())?;
        let target = self.target_profile(target_id).await?;
        policy::check_manage(actor, target.id, target.role)?;

        if target.is_approved {
            return Ok(target);
        }

        let updated = self.profiles.set_approved(target_id, true).await?;

        let entry = caller
            .activity(ActivityAction::ProfileUpdate)
            .target(target_id, target.email.as_str())
            .details(json!({
                "changes": { "is_approved": { "old": false, "new": true } },
                "isOwnProfile": false,
            }));
        self.record(entry).await;

        Ok(updated)
    }

    /// Delete an account and its profile.
    ///
    /// The audit entry is written only once both the account and the profile
    /// are gone. It names the removed user from the values read beforehand.
    ///
    /// # Errors
    ///
    /// 403 unless the caller may manage the target, 400 when `confirmEmail`
    /// does not match the target's email, 404 for an unknown target.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn delete_user(
        &self,
        caller: &Caller,
        request: DeleteUserRequest,
    ) -> Result<(), AccountError> {
        let actor = caller.require_admin(ONLY_ADMINS_MANAGE)?;
        let target_id = required_user_id(request.user_id.as_deref())?;

        let profile = self.profiles.get(target_id).await?;
        let account = self.identity.get_user(target_id).await?;
        let (email, role, display_name) = match (&profile, &account) {
            (Some(profile), _) => (profile.email.to_string(), profile.role, profile.name()),
            (None, Some(account)) => (account.email.clone(), Role::User, account.email.clone()),
            (None, None) => return Err(AccountError::NotFound(USER_NOT_FOUND.to_owned())),
        };
        policy::check_manage(actor, target_id, role)?;

        let confirmed = request
            .confirm_email
            .as_deref()
            .is_some_and(|confirm| confirm.trim().eq_ignore_ascii_case(email.trim()));
        if !confirmed {
            return Err(AccountError::Validation(
                "Confirmation email does not match".to_owned(),
            ));
        }

        if account.is_some() {
            self.identity.delete_user(target_id).await?;
        }
        self.profiles.delete(target_id).await?;

        let entry = caller
            .activity(ActivityAction::UserDelete)
            .target(target_id, email.as_str())
            .details(json!({
                "deletedUserDisplayName": display_name,
                "deletedUserRole": role,
            }));
        self.record(entry).await;

        info!(target = %target_id, "User deleted");
        Ok(())
    }

    /// Edit a display name: the caller's own, or a manageable user's.
    ///
    /// The owner is notified when the edit was made by someone else.
    ///
    /// # Errors
    ///
    /// 403 when editing someone the caller may not manage, 404 when the target
    /// (or the caller's own profile) does not exist, 400 for an over-long name.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn update_profile(
        &self,
        caller: &Caller,
        request: UpdateProfileRequest,
    ) -> Result<AppUser, AccountError> {
        let own_id = caller.identity.id;
        let target_id = match request.user_id.as_deref().map(str::trim) {
            None | Some("") => own_id,
            Some(raw) => raw
                .parse::<UserId>()
                .map_err(|_| AccountError::NotFound(USER_NOT_FOUND.to_owned()))?,
        };
        let is_own_profile = target_id == own_id;

        let target = if is_own_profile {
            caller
                .profile
                .clone()
                .ok_or_else(|| AccountError::NotFound("Profile not found".to_owned()))?
        } else {
            let actor = caller.require_admin(ONLY_ADMINS_MANAGE)?;
            let target = self.target_profile(target_id).await?;
            policy::check_manage(actor, target.id, target.role)?;
            target
        };

        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        if display_name.is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME_LENGTH) {
            return Err(AccountError::Validation(format!(
                "Display name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
            )));
        }

        if target.display_name.as_deref() == display_name {
            return Ok(target);
        }

        let updated = self
            .profiles
            .update_display_name(target_id, display_name)
            .await?;

        let changes = json!({
            "display_name": { "old": target.display_name, "new": display_name },
        });
        let entry = caller
            .activity(ActivityAction::ProfileUpdate)
            .target(target_id, target.email.as_str())
            .details(json!({
                "changes": changes,
                "isOwnProfile": is_own_profile,
            }));
        self.record(entry).await;
        if !is_own_profile {
            self.notify(NewNotification::profile_updated(
                target_id,
                &caller.identity.email,
                changes,
            ))
            .await;
        }

        Ok(updated)
    }

    /// Change the caller's own password after re-verifying the current one.
    ///
    /// # Errors
    ///
    /// 400 when a field is missing, the new password is too short, or the
    /// current password is wrong.
    #[instrument(skip(self, caller, request), fields(actor = %caller.identity.id))]
    pub async fn change_password(
        &self,
        caller: &Caller,
        request: ChangePasswordRequest,
    ) -> Result<(), AccountError> {
        let current = request
            .current_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AccountError::Validation("Current password is required".to_owned()))?;
        let new = request.new_password.unwrap_or_default();
        if new.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AccountError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let verified = self
            .identity
            .verify_password(&caller.identity.email, &SecretString::from(current))
            .await?;
        if !verified {
            return Err(AccountError::Validation(
                "Current password is incorrect".to_owned(),
            ));
        }

        self.identity
            .set_password(caller.identity.id, &SecretString::from(new))
            .await?;

        let entry = caller
            .activity(ActivityAction::PasswordChange)
            .target(caller.identity.id, caller.identity.email.as_str())
            .details(json!({ "selfChange": true }));
        self.record(entry).await;

        Ok(())
    }

    /// Profiles for the management view, newest first.
    ///
    /// # Errors
    ///
    /// 403 unless the caller is an admin or moderator.
    pub async fn list_users(
        &self,
        caller: &Caller,
        pending_only: bool,
    ) -> Result<Vec<AppUser>, AccountError> {
        let actor = caller
            .profile
            .as_ref()
            .ok_or_else(|| AccountError::Forbidden(PolicyViolation::NotStaff.to_string()))?;
        policy::check_view_users(actor)?;
        Ok(self.profiles.list(pending_only).await?)
    }

    /// One page of audit entries, newest first.
    ///
    /// # Errors
    ///
    /// 403 unless the caller is an admin.
    pub async fn activity_logs(
        &self,
        caller: &Caller,
        query: &ActivityLogQuery,
    ) -> Result<Vec<ActivityLog>, AccountError> {
        caller.require_admin(ONLY_ADMINS_LOGS)?;
        Ok(self.activity.list(query).await?)
    }

    /// The caller's latest notifications, newest first, with their unread count.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Repository`] when notification storage fails.
    pub async fn notifications(&self, caller: &Caller) -> Result<NotificationFeed, AccountError> {
        let user_id = caller.identity.id;
        let notifications = self
            .notifications
            .list(user_id, NOTIFICATION_LIST_LIMIT)
            .await?;
        let unread_count = self.notifications.unread_count(user_id).await?;
        Ok(NotificationFeed {
            notifications,
            unread_count,
        })
    }

    /// Mark one of the caller's notifications read, or all of them when no
    /// id is given. Returns how many notifications were marked.
    ///
    /// # Errors
    ///
    /// 404 when the id does not name one of the caller's notifications.
    #[instrument(skip(self, caller, request), fields(user = %caller.identity.id))]
    pub async fn mark_notifications_read(
        &self,
        caller: &Caller,
        request: NotificationRequest,
    ) -> Result<u64, AccountError> {
        let user_id = caller.identity.id;
        let Some(raw) = request
            .notification_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(self.notifications.mark_all_read(user_id).await?);
        };
        let id = notification_id(raw)?;
        self.notifications
            .mark_read(user_id, id)
            .await
            .map_err(notification_missing)?;
        Ok(1)
    }

    /// Delete one of the caller's notifications.
    ///
    /// # Errors
    ///
    /// 400 without an id, 404 when it does not name one of the caller's
    /// notifications.
    #[instrument(skip(self, caller, request), fields(user = %caller.identity.id))]
    pub async fn delete_notification(
        &self,
        caller: &Caller,
        request: NotificationRequest,
    ) -> Result<(), AccountError> {
        let raw = request
            .notification_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AccountError::Validation("Notification ID is required".to_owned()))?;
        let id = notification_id(raw)?;
        self.notifications
            .delete(caller.identity.id, id)
            .await
            .map_err(notification_missing)
    }

    /// Profile of a management target, 404 when absent.
    async fn target_profile(&self, id: UserId) -> Result<AppUser, AccountError> {
        self.profiles
            .get(id)
            .await?
            .ok_or_else(|| AccountError::NotFound(USER_NOT_FOUND.to_owned()))
    }

    /// Append an audit entry. Failures are logged, never returned.
    async fn record(&self, entry: NewActivityLog) {
        if let Err(e) = self.activity.append(&entry).await {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                error = %e,
                action = %entry.action_type,
                actor = %entry.actor_id,
                sentry_event_id = %event_id,
                "Failed to write activity log"
            );
        }
    }

    /// Store a notification for the affected user. Failures are logged, never returned.
    async fn notify(&self, notification: NewNotification) {
        if let Err(e) = self.notifications.create(&notification).await {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                error = %e,
                kind = %notification.kind,
                recipient = %notification.user_id,
                sentry_event_id = %event_id,
                "Failed to create notification"
            );
        }
    }
}

fn notification_id(raw: &str) -> Result<NotificationId, AccountError> {
    raw.parse()
        .map_err(|_| AccountError::NotFound(NOTIFICATION_NOT_FOUND.to_owned()))
}

fn notification_missing(err: RepositoryError) -> AccountError {
    match err {
        RepositoryError::NotFound => AccountError::NotFound(NOTIFICATION_NOT_FOUND.to_owned()),
        other => AccountError::Repository(other),
    }
}

fn required_email(raw: Option<&str>) -> Result<Email, AccountError> {
    Ok(Email::parse(raw.unwrap_or_default())?)
}

/// Parse a target id. Blank is a validation error; an id that cannot name
/// any account is reported as not found.
fn required_user_id(raw: Option<&str>) -> Result<UserId, AccountError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(AccountError::Validation(USER_ID_REQUIRED.to_owned()));
    };
    raw.parse()
        .map_err(|_| AccountError::NotFound(USER_NOT_FOUND.to_owned()))
}

fn optional_role(raw: Option<&str>) -> Result<Option<Role>, AccountError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AccountError::Validation(format!("Invalid role: {raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use insight_library_core::{NotificationKind, SUPER_ADMIN_EMAIL};

    use super::*;
    use crate::memory::MemoryBackends;
    use crate::services::password::{PASSWORD_ALPHABET, PASSWORD_LENGTH};

    const SITE: &str = "https://game-industry-insight.replit.app/";

    struct World {
        backends: MemoryBackends,
        service: AccountService,
    }

    impl World {
        fn new() -> Self {
            let backends = MemoryBackends::new();
            let service = backends.account_service(SITE);
            Self { backends, service }
        }

        async fn caller(&self, email: &str, role: Role) -> Caller {
            let (_, token) = self.backends.seed_user(email, "pw-123456", role, true);
            self.service.authenticate(&token).await.unwrap()
        }
    }

    fn target(user: &AppUser) -> TargetRequest {
        TargetRequest {
            user_id: Some(user.id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_token() {
        let world = World::new();
        let err = world.service.authenticate("bogus").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidToken));
    }

    #[tokio::test]
    async fn test_create_user_mints_approved_account() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;

        let account = world
            .service
            .create_user(
                &admin,
                CreateUserRequest {
                    email: Some(" new@studio.test ".to_owned()),
                    display_name: None,
                    role: Some("moderator".to_owned()),
                },
            )
            .await
            .unwrap();

        let creds = &account.credentials;
        assert_eq!(creds.email, "new@studio.test");
        assert_eq!(creds.display_name.as_deref(), Some("new"));
        assert_eq!(creds.role, Some(Role::Moderator));
        assert_eq!(creds.site_url, SITE);
        assert_eq!(creds.password.len(), PASSWORD_LENGTH);
        assert!(creds.password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert!(account.email_sent);
        assert_eq!(account.message(), "User created successfully and welcome email sent");

        let profile = world.backends.profiles.get_sync(account.user_id).unwrap();
        assert!(profile.is_approved);
        assert_eq!(profile.role, Role::Moderator);
        assert_eq!(
            world.backends.identity.password_of(account.user_id).as_deref(),
            Some(creds.password.as_str())
        );

        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::UserCreate);
        assert_eq!(logs[0].target_user_id, Some(account.user_id));
        assert_eq!(logs[0].actor_id, admin.identity.id);
        assert_eq!(logs[0].details["emailSent"], true);
        assert_eq!(logs[0].details["role"], "moderator");
    }

    #[tokio::test]
    async fn test_create_user_reports_failed_email_without_failing() {
        let world = World::new();
        world.backends.mailer.fail(true);
        let admin = world.caller("admin@studio.test", Role::Admin).await;

        let account = world
            .service
            .create_user(
                &admin,
                CreateUserRequest {
                    email: Some("new@studio.test".to_owned()),
                    ..CreateUserRequest::default()
                },
            )
            .await
            .unwrap();

        assert!(!account.email_sent);
        assert_eq!(account.message(), "User created successfully");
        assert_eq!(account.credentials.role, Some(Role::User));
        assert_eq!(world.backends.activity.entries()[0].details["emailSent"], false);
    }

    #[tokio::test]
    async fn test_create_user_audits_missing_profile() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        world.backends.profiles.fail_provisioning(true);

        let account = world
            .service
            .create_user(
                &admin,
                CreateUserRequest {
                    email: Some("new@studio.test".to_owned()),
                    ..CreateUserRequest::default()
                },
            )
            .await
            .unwrap();

        assert!(!account.profile_provisioned);
        assert!(world.backends.profiles.get_sync(account.user_id).is_none());
        assert!(world.backends.identity.password_of(account.user_id).is_some());
        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details["profileProvisioned"], false);
    }

    #[tokio::test]
    async fn test_create_user_requires_admin_before_validation() {
        let world = World::new();
        let moderator = world.caller("mod@studio.test", Role::Moderator).await;

        let err = world
            .service
            .create_user(&moderator, CreateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(msg) if msg == "Only admins can create users"));
        assert!(world.backends.activity.entries().is_empty());
    }

    #[tokio::test]
    async fn test_create_user_validates_email_and_role() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;

        let err = world
            .service
            .create_user(&admin, CreateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(msg) if msg == "Email is required"));

        let err = world
            .service
            .create_user(
                &admin,
                CreateUserRequest {
                    email: Some("new@studio.test".to_owned()),
                    role: Some("owner".to_owned()),
                    ..CreateUserRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn test_only_super_admin_creates_admins() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let request = CreateUserRequest {
            email: Some("boss@studio.test".to_owned()),
            role: Some("admin".to_owned()),
            ..CreateUserRequest::default()
        };

        let err = world
            .service
            .create_user(&admin, request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));
        assert_eq!(world.backends.identity.account_count(), 1);

        let root = world.caller(SUPER_ADMIN_EMAIL, Role::Admin).await;
        let account = world.service.create_user(&root, request).await.unwrap();
        assert_eq!(account.credentials.role, Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_create_user_surfaces_backend_refusal() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        world.backends.seed_user("taken@studio.test", "pw-123456", Role::User, true);

        let err = world
            .service
            .create_user(
                &admin,
                CreateUserRequest {
                    email: Some("taken@studio.test".to_owned()),
                    ..CreateUserRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Upstream(msg) if msg.contains("already been registered")));
        assert!(world.backends.activity.entries().is_empty());
    }

    #[tokio::test]
    async fn test_reset_password_by_regular_admin() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "old-password", Role::User, true);

        let creds = world
            .service
            .reset_password(&admin, target(&user))
            .await
            .unwrap();

        assert_eq!(creds.email, "user@studio.test");
        assert_eq!(creds.password.len(), PASSWORD_LENGTH);
        assert!(creds.role.is_none());
        assert_eq!(
            world.backends.identity.password_of(user.id).as_deref(),
            Some(creds.password.as_str())
        );

        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::PasswordReset);
        assert_eq!(logs[0].actor_id, admin.identity.id);
        assert_eq!(logs[0].target_user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_reset_password_errors() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let other_admin = world.caller("other@studio.test", Role::Admin).await;
        let user = world.caller("user@studio.test", Role::User).await;

        let err = world
            .service
            .reset_password(&user, TargetRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(msg) if msg == "Only admins can reset passwords"));

        let err = world
            .service
            .reset_password(&admin, TargetRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(msg) if msg == "User ID is required"));

        let err = world
            .service
            .reset_password(
                &admin,
                TargetRequest {
                    user_id: Some(UserId::random().to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(msg) if msg == "User not found"));

        let err = world
            .service
            .reset_password(&admin, target(other_admin.profile.as_ref().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));
        assert!(world.backends.activity.entries().is_empty());
    }

    #[tokio::test]
    async fn test_reset_password_succeeds_when_audit_write_fails() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "old-password", Role::User, true);
        world.backends.activity.fail_appends(true);

        let creds = world
            .service
            .reset_password(&admin, target(&user))
            .await
            .unwrap();
        assert_eq!(
            world.backends.identity.password_of(user.id).as_deref(),
            Some(creds.password.as_str())
        );
        assert!(world.backends.activity.entries().is_empty());
    }

    #[tokio::test]
    async fn test_regular_admin_cannot_demote_admin() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let other = world.caller("other@studio.test", Role::Admin).await;

        let err = world
            .service
            .update_role(
                &admin,
                UpdateRoleRequest {
                    user_id: Some(other.identity.id.to_string()),
                    role: Some("moderator".to_owned()),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Forbidden(_)));
        let unchanged = world.backends.profiles.get_sync(other.identity.id).unwrap();
        assert_eq!(unchanged.role, Role::Admin);
        assert!(world.backends.activity.entries().is_empty());
    }

    #[tokio::test]
    async fn test_update_role_audits_only_real_changes() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::User, true);
        let request = UpdateRoleRequest {
            user_id: Some(user.id.to_string()),
            role: Some("moderator".to_owned()),
        };

        let updated = world
            .service
            .update_role(&admin, request.clone())
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Moderator);

        world.service.update_role(&admin, request).await.unwrap();

        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::RoleChange);
        assert_eq!(logs[0].details["oldRole"], "user");
        assert_eq!(logs[0].details["newRole"], "moderator");

        let notes = world.backends.notifications.all();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_id, user.id);
        assert_eq!(notes[0].kind, NotificationKind::RoleChange);
        assert_eq!(notes[0].message, "Your role has been changed from user to moderator.");
        assert_eq!(notes[0].metadata["oldRole"], "user");
        assert_eq!(notes[0].metadata["changedBy"], "admin@studio.test");
    }

    #[tokio::test]
    async fn test_update_role_succeeds_when_notification_fails() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::User, true);
        world.backends.notifications.fail_inserts(true);

        let updated = world
            .service
            .update_role(
                &admin,
                UpdateRoleRequest {
                    user_id: Some(user.id.to_string()),
                    role: Some("moderator".to_owned()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Moderator);
        assert_eq!(world.backends.activity.entries().len(), 1);
        assert!(world.backends.notifications.all().is_empty());
    }

    #[tokio::test]
    async fn test_update_role_refuses_self_and_admin_promotion() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::User, true);

        let err = world
            .service
            .update_role(
                &admin,
                UpdateRoleRequest {
                    user_id: Some(admin.identity.id.to_string()),
                    role: Some("user".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));

        let err = world
            .service
            .update_role(
                &admin,
                UpdateRoleRequest {
                    user_id: Some(user.id.to_string()),
                    role: Some("admin".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, AccountError::Forbidden(msg) if msg == PolicyViolation::AdminPromotion.to_string())
        );
    }

    #[tokio::test]
    async fn test_approve_user() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (pending, _) = world
            .backends
            .seed_user("pending@studio.test", "pw-123456", Role::User, false);

        let approved = world
            .service
            .approve_user(&admin, target(&pending))
            .await
            .unwrap();
        assert!(approved.is_approved);

        world
            .service
            .approve_user(&admin, target(&pending))
            .await
            .unwrap();
        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::ProfileUpdate);
        assert_eq!(logs[0].details["changes"]["is_approved"]["new"], true);
    }

    #[tokio::test]
    async fn test_delete_user_requires_matching_confirmation() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::Moderator, true);

        let err = world
            .service
            .delete_user(
                &admin,
                DeleteUserRequest {
                    user_id: Some(user.id.to_string()),
                    confirm_email: Some("someone@studio.test".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
        assert!(world.backends.profiles.get_sync(user.id).is_some());

        world
            .service
            .delete_user(
                &admin,
                DeleteUserRequest {
                    user_id: Some(user.id.to_string()),
                    confirm_email: Some("USER@studio.test".to_owned()),
                },
            )
            .await
            .unwrap();

        assert!(world.backends.profiles.get_sync(user.id).is_none());
        assert!(world.backends.identity.password_of(user.id).is_none());
        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::UserDelete);
        assert_eq!(logs[0].details["deletedUserRole"], "moderator");
        assert_eq!(logs[0].details["deletedUserDisplayName"], "user");
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_no_audit_entry() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::User, true);
        world.backends.identity.fail_deletes(true);

        let err = world
            .service
            .delete_user(
                &admin,
                DeleteUserRequest {
                    user_id: Some(user.id.to_string()),
                    confirm_email: Some("user@studio.test".to_owned()),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Upstream(_)));
        assert!(world.backends.activity.entries().is_empty());
        assert!(world.backends.profiles.get_sync(user.id).is_some());
        assert!(world.backends.identity.password_of(user.id).is_some());
    }

    #[tokio::test]
    async fn test_update_own_profile() {
        let world = World::new();
        let user = world.caller("reader@studio.test", Role::User).await;

        let updated = world
            .service
            .update_profile(
                &user,
                UpdateProfileRequest {
                    user_id: None,
                    display_name: Some("  Reader One ".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Reader One"));

        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details["isOwnProfile"], true);
        assert_eq!(logs[0].details["changes"]["display_name"]["new"], "Reader One");
        assert!(world.backends.notifications.all().is_empty());
    }

    #[tokio::test]
    async fn test_update_other_profile_requires_manage() {
        let world = World::new();
        let moderator = world.caller("mod@studio.test", Role::Moderator).await;
        let (user, _) = world
            .backends
            .seed_user("user@studio.test", "pw-123456", Role::User, true);

        let err = world
            .service
            .update_profile(
                &moderator,
                UpdateProfileRequest {
                    user_id: Some(user.id.to_string()),
                    display_name: Some("Renamed".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));

        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let updated = world
            .service
            .update_profile(
                &admin,
                UpdateProfileRequest {
                    user_id: Some(user.id.to_string()),
                    display_name: Some("Renamed".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Renamed"));
        assert_eq!(world.backends.activity.entries()[0].details["isOwnProfile"], false);

        let notes = world.backends.notifications.all();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_id, user.id);
        assert_eq!(notes[0].kind, NotificationKind::ProfileUpdated);
        assert_eq!(notes[0].title, "Your profile was updated");
        assert_eq!(notes[0].metadata["updatedBy"], "admin@studio.test");
        assert_eq!(notes[0].metadata["changes"]["display_name"]["new"], "Renamed");
    }

    #[tokio::test]
    async fn test_notifications_are_read_and_marked_per_caller() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let reader = world.caller("reader@studio.test", Role::User).await;
        let bystander = world.caller("other@studio.test", Role::User).await;
        for role in ["moderator", "user"] {
            world
                .service
                .update_role(
                    &admin,
                    UpdateRoleRequest {
                        user_id: Some(reader.identity.id.to_string()),
                        role: Some(role.to_owned()),
                    },
                )
                .await
                .unwrap();
        }

        let feed = world.service.notifications(&reader).await.unwrap();
        assert_eq!(feed.unread_count, 2);
        assert_eq!(feed.notifications[0].metadata["newRole"], "user");
        assert_eq!(feed.notifications[1].metadata["newRole"], "moderator");
        assert!(world.service.notifications(&bystander).await.unwrap().notifications.is_empty());

        let newest = NotificationRequest {
            notification_id: Some(feed.notifications[0].id.to_string()),
        };
        let err = world
            .service
            .mark_notifications_read(&bystander, newest.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(msg) if msg == "Notification not found"));

        assert_eq!(
            world.service.mark_notifications_read(&reader, newest.clone()).await.unwrap(),
            1
        );
        assert_eq!(world.service.notifications(&reader).await.unwrap().unread_count, 1);
        assert_eq!(
            world
                .service
                .mark_notifications_read(&reader, NotificationRequest::default())
                .await
                .unwrap(),
            1
        );

        world.service.delete_notification(&reader, newest.clone()).await.unwrap();
        let err = world
            .service
            .delete_notification(&reader, newest)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
        let feed = world.service.notifications(&reader).await.unwrap();
        assert_eq!(feed.notifications.len(), 1);
        assert_eq!(feed.unread_count, 0);
    }

    #[tokio::test]
    async fn test_change_password() {
        let world = World::new();
        let user = world.caller("reader@studio.test", Role::User).await;

        let err = world
            .service
            .change_password(
                &user,
                ChangePasswordRequest {
                    current_password: Some("pw-123456".to_owned()),
                    new_password: Some("short".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));

        let err = world
            .service
            .change_password(
                &user,
                ChangePasswordRequest {
                    current_password: Some("wrong-one".to_owned()),
                    new_password: Some("brand-new-pw".to_owned()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(msg) if msg == "Current password is incorrect"));

        world
            .service
            .change_password(
                &user,
                ChangePasswordRequest {
                    current_password: Some("pw-123456".to_owned()),
                    new_password: Some("brand-new-pw".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            world.backends.identity.password_of(user.identity.id).as_deref(),
            Some("brand-new-pw")
        );
        let logs = world.backends.activity.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActivityAction::PasswordChange);
        assert_eq!(logs[0].details["selfChange"], true);
    }

    #[tokio::test]
    async fn test_list_users_and_logs_permissions() {
        let world = World::new();
        let admin = world.caller("admin@studio.test", Role::Admin).await;
        let moderator = world.caller("mod@studio.test", Role::Moderator).await;
        let user = world.caller("user@studio.test", Role::User).await;
        world
            .backends
            .seed_user("pending@studio.test", "pw-123456", Role::User, false);

        assert_eq!(world.service.list_users(&moderator, false).await.unwrap().len(), 4);
        let pending = world.service.list_users(&admin, true).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email.as_str(), "pending@studio.test");
        assert!(matches!(
            world.service.list_users(&user, false).await,
            Err(AccountError::Forbidden(_))
        ));

        let query = ActivityLogQuery::default();
        assert!(world.service.activity_logs(&admin, &query).await.is_ok());
        assert!(matches!(
            world.service.activity_logs(&moderator, &query).await,
            Err(AccountError::Forbidden(_))
        ));
    }
}
