//! Profile loader.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use insight_library_core::AppUser;

use crate::backend::{AuthBackend, Session};

/// Fetches the profile row for a session, bounded by a timeout.
///
/// Never fails: an error, a missing row and a timeout all resolve to `None`
/// so that callers waiting on the profile always make progress.
#[derive(Clone)]
pub struct ProfileLoader {
    backend: Arc<dyn AuthBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for ProfileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileLoader")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProfileLoader {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    #[instrument(skip_all, fields(user_id = %session.user.id))]
    pub async fn load(&self, session: &Session) -> Option<AppUser> {
        let fetch = self
            .backend
            .fetch_profile(&session.access_token, session.user.id);

        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(Some(profile))) => Some(profile),
            Ok(Ok(None)) => {
                debug!("No profile row for session user");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Profile fetch failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), "Profile fetch timed out");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use insight_library_core::Role;

    async fn signed_in(backend: &MemoryBackend) -> Session {
        backend
            .insert_user("reader@studio.test", "secret1", Role::User, true)
            .unwrap();
        backend
            .sign_in_with_password("reader@studio.test", "secret1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_loads_profile() {
        let backend = Arc::new(MemoryBackend::new());
        let session = signed_in(&backend).await;
        let loader = ProfileLoader::new(backend, Duration::from_secs(3));

        let profile = loader.load(&session).await.unwrap();
        assert_eq!(profile.id, session.user.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_resolves_to_none_after_timeout() {
        let backend = Arc::new(MemoryBackend::new());
        let session = signed_in(&backend).await;
        backend.set_profile_delay(Some(Duration::from_secs(10)));
        let loader = ProfileLoader::new(backend, Duration::from_secs(3));

        let started = tokio::time::Instant::now();
        assert!(loader.load(&session).await.is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_errors_and_missing_rows_degrade_to_none() {
        let backend = Arc::new(MemoryBackend::new());
        let session = signed_in(&backend).await;
        let loader = ProfileLoader::new(backend.clone(), Duration::from_secs(3));

        backend.fail_profile_fetches(true);
        assert!(loader.load(&session).await.is_none());

        backend.fail_profile_fetches(false);
        backend.remove_profile(session.user.id);
        assert!(loader.load(&session).await.is_none());
    }
}
