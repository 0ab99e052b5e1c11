//! Insight Library Core - Shared account types and authorization policy.
//!
//! This crate provides the types shared by every Insight Library component:
//! - `functions` - Privileged account service (create user, reset password, audit log)
//! - `client` - Auth context, session store and admin operations client
//! - `cli` - Command-line tools for migrations and account bootstrap
//!
//! # Architecture
//!
//! The core crate contains only types and pure decision logic - no I/O, no
//! database access, no HTTP clients. The same policy predicates run in the
//! client (to short-circuit forbidden actions before any request) and in the
//! functions service (where they are the actual security boundary).
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, roles, profiles, audit entries,
//!   notifications and credentials
//! - [`policy`] - Who may act on whom

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod policy;
pub mod types;

pub use policy::{PolicyViolation, SUPER_ADMIN_EMAIL};
pub use types::*;
