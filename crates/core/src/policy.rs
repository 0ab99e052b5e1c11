//! Who may act on whom.
//!
//! These predicates run twice for every management action: in the client,
//! to refuse a forbidden request before it is sent, and in the functions
//! service, where they are the actual security boundary.
//!
//! Rules:
//! - only admins manage other accounts
//! - nobody manages themselves through the admin path (self-edits have their own route)
//! - the super-admin may manage anyone else
//! - a regular admin may not touch another admin, and may not grant `admin`

use crate::types::{AppUser, Role, UserId};

/// The distinguished super-admin identity.
///
/// A single compiled-in address with no rotation or recovery path. Compared
/// case-insensitively against the actor's profile email.
pub const SUPER_ADMIN_EMAIL: &str = "hungdt@athena.studio";

/// Reason a management action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Only admins can manage users")]
    NotAdmin,
    #[error("You cannot change your own account through user management.")]
    SelfManagement,
    #[error("Only the super admin can modify other administrators.")]
    AdminTarget,
    #[error("Only the super admin can promote users to admin.")]
    AdminPromotion,
    #[error("Only admins and moderators can view users")]
    NotStaff,
}

/// Whether an email address is the super-admin's.
#[must_use]
pub fn is_super_admin_email(email: &str) -> bool {
    email.trim().eq_ignore_ascii_case(SUPER_ADMIN_EMAIL)
}

/// Whether the profile belongs to the super-admin.
#[must_use]
pub fn is_super_admin(user: &AppUser) -> bool {
    is_super_admin_email(user.email.as_str())
}

/// Check that `actor` may manage the account `target_id` currently holding
/// `target_role`.
///
/// Takes the target's id and role rather than a full profile so that
/// accounts without a profile row can be checked as plain users.
///
/// # Errors
///
/// Returns the first rule the action violates.
pub fn check_manage(
    actor: &AppUser,
    target_id: UserId,
    target_role: Role,
) -> Result<(), PolicyViolation> {
    if !actor.is_admin() {
        return Err(PolicyViolation::NotAdmin);
    }
    if actor.id == target_id {
        return Err(PolicyViolation::SelfManagement);
    }
    if is_super_admin(actor) {
        return Ok(());
    }
    if target_role.is_admin() {
        return Err(PolicyViolation::AdminTarget);
    }
    Ok(())
}

/// `canManage(actor, target)`.
#[must_use]
pub fn can_manage(actor: &AppUser, target: &AppUser) -> bool {
    check_manage(actor, target.id, target.role).is_ok()
}

/// Check that `actor` may hand out `role` at all (used on account creation).
///
/// # Errors
///
/// [`PolicyViolation::NotAdmin`] for non-admins and
/// [`PolicyViolation::AdminPromotion`] when a regular admin grants `admin`.
pub fn check_role_assignment(actor: &AppUser, role: Role) -> Result<(), PolicyViolation> {
    if !actor.is_admin() {
        return Err(PolicyViolation::NotAdmin);
    }
    if role.is_admin() && !is_super_admin(actor) {
        return Err(PolicyViolation::AdminPromotion);
    }
    Ok(())
}

/// Check that `actor` may see the user list (admins and moderators).
///
/// # Errors
///
/// [`PolicyViolation::NotStaff`] for regular users.
pub const fn check_view_users(actor: &AppUser) -> Result<(), PolicyViolation> {
    if actor.is_moderator() {
        Ok(())
    } else {
        Err(PolicyViolation::NotStaff)
    }
}

/// Check that `actor` may set `target`'s role to `new_role`.
///
/// # Errors
///
/// Returns the violated rule: the target must be manageable and only the
/// super-admin may assign `admin`.
pub fn check_role_change(
    actor: &AppUser,
    target: &AppUser,
    new_role: Role,
) -> Result<(), PolicyViolation> {
    check_manage(actor, target.id, target.role)?;
    check_role_assignment(actor, new_role)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::Email;

    fn user(email: &str, role: Role) -> AppUser {
        AppUser {
            id: UserId::random(),
            email: Email::parse(email).unwrap(),
            display_name: None,
            avatar_url: None,
            role,
            is_approved: true,
            created_at: Utc::now(),
        }
    }

    fn super_admin() -> AppUser {
        user(SUPER_ADMIN_EMAIL, Role::Admin)
    }

    #[test]
    fn test_super_admin_email_is_case_insensitive() {
        assert!(is_super_admin_email("HungDT@Athena.Studio"));
        assert!(is_super_admin_email(" hungdt@athena.studio "));
        assert!(!is_super_admin_email("admin@athena.studio"));
    }

    #[test]
    fn test_nobody_manages_themselves() {
        for actor in [
            super_admin(),
            user("a@x.com", Role::Admin),
            user("m@x.com", Role::Moderator),
            user("u@x.com", Role::User),
        ] {
            assert!(!can_manage(&actor, &actor));
        }
        let admin = user("a@x.com", Role::Admin);
        assert_eq!(
            check_manage(&admin, admin.id, Role::User),
            Err(PolicyViolation::SelfManagement)
        );
    }

    #[test]
    fn test_non_admins_manage_nobody() {
        let moderator = user("m@x.com", Role::Moderator);
        let reader = user("u@x.com", Role::User);
        assert!(!can_manage(&moderator, &reader));
        assert_eq!(
            check_manage(&reader, moderator.id, Role::Moderator),
            Err(PolicyViolation::NotAdmin)
        );
    }

    #[test]
    fn test_super_admin_email_without_admin_role_is_not_admin() {
        let demoted = user(SUPER_ADMIN_EMAIL, Role::User);
        let reader = user("u@x.com", Role::User);
        assert!(!can_manage(&demoted, &reader));
    }

    #[test]
    fn test_regular_admin_cannot_touch_admins() {
        let admin = user("a@x.com", Role::Admin);
        let other = user("b@x.com", Role::Admin);
        let moderator = user("m@x.com", Role::Moderator);
        assert!(!can_manage(&admin, &other));
        assert!(can_manage(&admin, &moderator));
        assert!(can_manage(&super_admin(), &other));
    }

    #[test]
    fn test_only_super_admin_grants_admin() {
        let admin = user("a@x.com", Role::Admin);
        let reader = user("u@x.com", Role::User);
        assert_eq!(
            check_role_change(&admin, &reader, Role::Admin),
            Err(PolicyViolation::AdminPromotion)
        );
        assert_eq!(check_role_change(&admin, &reader, Role::Moderator), Ok(()));
        assert_eq!(check_role_change(&super_admin(), &reader, Role::Admin), Ok(()));
        assert_eq!(
            check_role_assignment(&admin, Role::Admin),
            Err(PolicyViolation::AdminPromotion)
        );
        assert_eq!(check_role_assignment(&admin, Role::User), Ok(()));
    }

    #[test]
    fn test_regular_admin_cannot_demote_admin() {
        let admin = user("a@x.com", Role::Admin);
        let other = user("b@x.com", Role::Admin);
        assert_eq!(
            check_role_change(&admin, &other, Role::Moderator),
            Err(PolicyViolation::AdminTarget)
        );
        assert_eq!(check_role_change(&super_admin(), &other, Role::Moderator), Ok(()));
    }

    #[test]
    fn test_only_staff_view_users() {
        assert_eq!(check_view_users(&user("m@x.com", Role::Moderator)), Ok(()));
        assert_eq!(check_view_users(&user("a@x.com", Role::Admin)), Ok(()));
        assert_eq!(
            check_view_users(&user("u@x.com", Role::User)),
            Err(PolicyViolation::NotStaff)
        );
    }
}
