//! Client configuration.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Backend base URL
//! - `SUPABASE_ANON_KEY` - Public API key sent with every backend request
//!
//! ## Optional
//! - `INSIGHT_FUNCTIONS_URL` - Functions service base URL (default: `<SUPABASE_URL>/functions/v1/`)
//! - `INSIGHT_STORAGE_DIR` - Directory for persisted client state (default: `.insight`)
//! - `INSIGHT_PROFILE_TIMEOUT_MS` - Profile fetch timeout (default: 3000)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default bound on a profile fetch.
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (auth and table API live under it).
    pub backend_url: Url,
    /// Public API key.
    pub anon_key: String,
    /// Functions service base URL, ending in `/`.
    pub functions_url: Url,
    /// Directory backing [`crate::storage::LocalStorage`].
    pub storage_dir: PathBuf,
    /// Bound on a single profile fetch.
    pub profile_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the backend.
    #[must_use]
    pub fn new(backend_url: Url, anon_key: impl Into<String>) -> Self {
        let backend_url = with_trailing_slash(backend_url);
        let functions_url = backend_url
            .join("functions/v1/")
            .unwrap_or_else(|_| backend_url.clone());
        Self {
            backend_url,
            anon_key: anon_key.into(),
            functions_url,
            storage_dir: PathBuf::from(".insight"),
            profile_timeout: DEFAULT_PROFILE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_functions_url(mut self, url: Url) -> Self {
        self.functions_url = with_trailing_slash(url);
        self
    }

    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_profile_timeout(mut self, timeout: Duration) -> Self {
        self.profile_timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let backend_url = parse_url("SUPABASE_URL", &get_required_env("SUPABASE_URL")?)?;
        let anon_key = get_required_env("SUPABASE_ANON_KEY")?;
        let mut config = Self::new(backend_url, anon_key);

        if let Some(raw) = get_optional_env("INSIGHT_FUNCTIONS_URL") {
            config = config.with_functions_url(parse_url("INSIGHT_FUNCTIONS_URL", &raw)?);
        }
        if let Some(dir) = get_optional_env("INSIGHT_STORAGE_DIR") {
            config = config.with_storage_dir(dir);
        }
        if let Some(raw) = get_optional_env("INSIGHT_PROFILE_TIMEOUT_MS") {
            let ms: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnvVar("INSIGHT_PROFILE_TIMEOUT_MS".to_string(), e.to_string())
            })?;
            config = config.with_profile_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    get_optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_functions_url() {
        let config = ClientConfig::new(Url::parse("https://project.supabase.co").unwrap(), "anon");
        assert_eq!(config.backend_url.as_str(), "https://project.supabase.co/");
        assert_eq!(
            config.functions_url.as_str(),
            "https://project.supabase.co/functions/v1/"
        );
        assert_eq!(config.profile_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_functions_url_override_gets_trailing_slash() {
        let config = ClientConfig::new(Url::parse("http://localhost:8000").unwrap(), "anon")
            .with_functions_url(Url::parse("http://127.0.0.1:54321/functions/v1").unwrap());
        assert_eq!(
            config.functions_url.join("invite-user").unwrap().as_str(),
            "http://127.0.0.1:54321/functions/v1/invite-user"
        );
    }
}
