//! Core types for Insight Library.
//!
//! This module provides type-safe wrappers for account and audit concepts.

pub mod activity;
pub mod credentials;
pub mod email;
pub mod id;
pub mod notification;
pub mod role;
pub mod user;

pub use activity::{
    ActivityAction, ActivityActionParseError, ActivityLog, ActivityLogQuery, NewActivityLog,
};
pub use credentials::{MIN_PASSWORD_LENGTH, UserCredentials};
pub use email::{Email, EmailError};
pub use id::*;
pub use notification::{
    NOTIFICATION_LIST_LIMIT, NewNotification, Notification, NotificationKind,
    NotificationKindParseError,
};
pub use role::{Role, RoleParseError};
pub use user::{AppUser, MAX_DISPLAY_NAME_LENGTH};
