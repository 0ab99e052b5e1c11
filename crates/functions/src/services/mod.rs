//! Business logic services for the functions service.
//!
//! # Services
//!
//! - `accounts` - Privileged account operations with audit logging
//! - `email` - Welcome email delivery via SMTP
//! - `password` - Generated one-time passwords

pub mod accounts;
pub mod email;
pub mod password;

pub use accounts::{AccountError, AccountService, Caller, ProvisionedAccount};
pub use email::{MailError, SmtpMailer, WelcomeMailer};
pub use password::generate_password;
