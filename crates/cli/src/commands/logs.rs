//! Activity log command.
//!
//! # Usage
//!
//! ```bash
//! il-cli logs list --action role_change --search studio --page 1
//! ```
//!
//! # Environment Variables
//!
//! - `FUNCTIONS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

use insight_library_core::{ActivityAction, ActivityLogQuery};
use insight_library_functions::db::{self, ActivityLogStore, PgActivityLogStore, RepositoryError};
use thiserror::Error;

use super::{CommandError, database_url};

/// Errors that can occur while reading the log.
#[derive(Debug, Error)]
pub enum LogsError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Print one page of entries, newest first.
///
/// # Errors
///
/// Returns an error for an unknown action type or an unreachable database.
pub async fn list(
    action: Option<&str>,
    search: Option<String>,
    page: u32,
    page_size: Option<u32>,
) -> Result<(), LogsError> {
    let action = action
        .map(|value| {
            value
                .parse::<ActivityAction>()
                .map_err(|_| LogsError::InvalidAction(value.to_owned()))
        })
        .transpose()?;
    let query = ActivityLogQuery {
        action,
        search,
        page,
        page_size: page_size.unwrap_or(ActivityLogQuery::DEFAULT_PAGE_SIZE),
    };

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    let logs = PgActivityLogStore::new(pool).list(&query).await?;

    tracing::info!("Page {} ({} entries)", query.page, logs.len());

    #[allow(clippy::print_stdout)]
    for log in &logs {
        println!(
            "{}  {:<16}  {} ({})  -> {}",
            log.created_at.format("%Y-%m-%d %H:%M:%S"),
            log.action_type,
            log.actor_email,
            log.actor_role,
            log.target_user_email.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
