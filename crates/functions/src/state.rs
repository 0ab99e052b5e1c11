//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::FunctionsConfig;
use crate::db::{PgActivityLogStore, PgNotificationStore, PgProfileStore};
use crate::identity::{GoTrueClient, IdentityError};
use crate::services::accounts::AccountService;
use crate::services::email::{SmtpMailer, WelcomeMailer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    accounts: AccountService,
}

impl AppState {
    /// Wrap an already-built account service.
    #[must_use]
    pub fn new(accounts: AccountService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { accounts }),
        }
    }

    /// Build the production state: GoTrue identity, Postgres storage and,
    /// when configured, SMTP welcome emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity HTTP client cannot be built.
    pub fn from_config(config: &FunctionsConfig, pool: PgPool) -> Result<Self, IdentityError> {
        let identity = Arc::new(GoTrueClient::new(&config.supabase)?);
        let mailer = match config.email().map(SmtpMailer::new) {
            Some(Ok(mailer)) => {
                tracing::info!("Welcome emails enabled");
                Some(Arc::new(mailer) as Arc<dyn WelcomeMailer>)
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Invalid SMTP relay, welcome emails disabled");
                None
            }
            None => {
                tracing::warn!("SMTP not configured, welcome emails disabled");
                None
            }
        };

        let accounts = AccountService::new(
            identity,
            Arc::new(PgProfileStore::new(pool.clone())),
            Arc::new(PgActivityLogStore::new(pool.clone())),
            Arc::new(PgNotificationStore::new(pool)),
            mailer,
            config.site_url.as_str(),
        );
        Ok(Self::new(accounts))
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.accounts
    }
}
