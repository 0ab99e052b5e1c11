//! Grid/list preference, persisted and kept in step across storage handles.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::storage::{LocalStorage, StorageError};

/// Storage slot holding the preference.
pub const VIEW_MODE_STORAGE_KEY: &str = "insight-view-mode";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl ViewMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::List => "list",
        }
    }

    /// `None` for anything but the two stored spellings.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "grid" => Some(Self::Grid),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The preference as seen through one storage handle.
#[derive(Debug)]
pub struct ViewModePreference {
    storage: LocalStorage,
    mode: watch::Sender<ViewMode>,
}

impl ViewModePreference {
    /// Read the stored preference. Missing, unreadable or unknown values
    /// fall back to [`ViewMode::Grid`].
    #[must_use]
    pub fn load(storage: LocalStorage) -> Self {
        let stored = match storage.get_item(VIEW_MODE_STORAGE_KEY) {
            Ok(value) => value.as_deref().and_then(ViewMode::parse),
            Err(e) => {
                warn!(error = %e, "Could not read view mode preference");
                None
            }
        };
        let (mode, _) = watch::channel(stored.unwrap_or_default());
        Self { storage, mode }
    }

    #[must_use]
    pub fn get(&self) -> ViewMode {
        *self.mode.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewMode> {
        self.mode.subscribe()
    }

    /// Persist and publish a new preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written; the in-memory value
    /// is left unchanged.
    pub fn set(&self, mode: ViewMode) -> Result<(), StorageError> {
        self.storage.set_item(VIEW_MODE_STORAGE_KEY, mode.as_str())?;
        self.mode.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
        Ok(())
    }

    /// Follow writes to the slot made through other handles.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.storage.subscribe();
        let preference = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                if change.key != VIEW_MODE_STORAGE_KEY {
                    continue;
                }
                let Some(mode) = change.new_value.as_deref().and_then(ViewMode::parse) else {
                    continue;
                };
                debug!(mode = %mode, "View mode changed elsewhere");
                preference.mode.send_if_modified(|current| {
                    let changed = *current != mode;
                    *current = mode;
                    changed
                });
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::temp_storage;

    #[test]
    fn test_defaults_to_grid_and_ignores_unknown_values() {
        let storage = temp_storage();
        assert_eq!(ViewModePreference::load(storage.clone()).get(), ViewMode::Grid);

        storage.set_item(VIEW_MODE_STORAGE_KEY, "masonry").unwrap();
        assert_eq!(ViewModePreference::load(storage.clone()).get(), ViewMode::Grid);

        storage.set_item(VIEW_MODE_STORAGE_KEY, "list").unwrap();
        assert_eq!(ViewModePreference::load(storage).get(), ViewMode::List);
    }

    #[test]
    fn test_set_persists() {
        let storage = temp_storage();
        let preference = ViewModePreference::load(storage.clone());
        preference.set(ViewMode::List).unwrap();

        assert_eq!(preference.get(), ViewMode::List);
        assert_eq!(
            storage.get_item(VIEW_MODE_STORAGE_KEY).unwrap().as_deref(),
            Some("list")
        );
    }

    #[tokio::test]
    async fn test_other_handles_follow_changes() {
        let storage = temp_storage();
        let tab_a = ViewModePreference::load(storage.clone());
        let tab_b = Arc::new(ViewModePreference::load(storage.clone()));
        let mut watching_b = tab_b.subscribe();
        let sync = tab_b.spawn_sync();

        // Ignored by the listener: wrong key, then an unknown value.
        storage.set_item("something-else", "list").unwrap();
        storage.set_item(VIEW_MODE_STORAGE_KEY, "cards").unwrap();
        tab_a.set(ViewMode::List).unwrap();

        watching_b.changed().await.unwrap();
        assert_eq!(*watching_b.borrow(), ViewMode::List);
        assert_eq!(tab_b.get(), ViewMode::List);
        sync.abort();
    }
}
