//! Account bootstrap commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first admin (prints the credentials once)
//! il-cli users create -e admin@studio.test -n "Studio Admin" -r admin
//!
//! # List accounts awaiting approval
//! il-cli users list --pending
//! ```
//!
//! # Environment Variables
//!
//! `users create` needs the full functions configuration (identity backend
//! keys included); `users list` only needs `FUNCTIONS_DATABASE_URL`.

use insight_library_client::CredentialsNotice;
use insight_library_core::{Email, Role};
use insight_library_functions::config::{ConfigError, FunctionsConfig};
use insight_library_functions::db::{self, PgProfileStore, ProfileStore, RepositoryError};
use insight_library_functions::identity::IdentityError;
use insight_library_functions::services::AccountError;
use insight_library_functions::state::AppState;
use thiserror::Error;

use super::{CommandError, database_url};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UsersError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, moderator, user")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Identity backend error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Provision a pre-approved account and print its one-shot credentials.
///
/// No activity entry is written: there is no acting admin.
///
/// # Errors
///
/// Returns an error for an invalid email or role, missing configuration, or
/// when the identity backend refuses the account.
pub async fn create(email: &str, name: Option<&str>, role: &str) -> Result<(), UsersError> {
    let role: Role = role
        .parse()
        .map_err(|_| UsersError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| UsersError::InvalidEmail(email.to_owned()))?;

    let config = FunctionsConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    let state = AppState::from_config(&config, pool)?;

    tracing::info!("Creating account: {} ({})", email, role);
    let account = state
        .accounts()
        .provision_account(&email, name, role)
        .await?;

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Role: {}",
        account.user_id,
        email,
        role
    );
    if !account.email_sent {
        tracing::warn!("Welcome email not sent. Share the credentials below out of band.");
    }

    #[allow(clippy::print_stdout)]
    {
        println!("{}", CredentialsNotice(&account.credentials));
    }
    Ok(())
}

/// Print profiles, newest first.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn list(pending_only: bool) -> Result<(), UsersError> {
    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    let users = PgProfileStore::new(pool).list(pending_only).await?;

    tracing::info!("{} account(s)", users.len());

    #[allow(clippy::print_stdout)]
    for user in &users {
        println!(
            "{}  {:<32}  {:<9}  {}  {}",
            user.id,
            user.email,
            user.role,
            if user.is_approved { "approved" } else { "pending " },
            user.display_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
