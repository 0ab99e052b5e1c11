//! Keyed local storage.
//!
//! Each slot is a file under the storage directory holding the raw string
//! value. Every handle opened on the same [`LocalStorage`] shares a change
//! channel, so a write through one handle is observed by the others the way
//! same-origin tabs observe each other's storage events. A handle never sees
//! its own writes on the channel.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 64;

/// Errors from reading or writing a storage slot.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// A write observed through another handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the slot was removed.
    pub new_value: Option<String>,
    source: u64,
}

struct Shared {
    dir: PathBuf,
    changes: broadcast::Sender<StorageChange>,
    next_handle: AtomicU64,
}

/// Handle to a directory of string slots.
pub struct LocalStorage {
    shared: Arc<Shared>,
    handle: u64,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("dir", &self.shared.dir)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Clones are independent handles: each observes the others' writes.
impl Clone for LocalStorage {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            handle: self.shared.next_handle.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl LocalStorage {
    /// Open (creating if needed) the storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                dir,
                changes,
                next_handle: AtomicU64::new(1),
            }),
            handle: 0,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    fn slot(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.shared.dir.join(key))
    }

    /// Raw value of a slot, `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid keys or unreadable files.
    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.slot(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a raw value and notify other handles.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid keys or unwritable files.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot(key)?;
        // Write-then-rename so readers never see a torn value.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    /// Clear a slot and notify other handles. Clearing an unset slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid keys or undeletable files.
    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.slot(key)?) {
            Ok(()) => {
                self.notify(key, None);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deserialize a JSON slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or is not valid JSON for `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.get_item(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    /// Serialize a value into a JSON slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or written.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.set_item(key, &serde_json::to_string(value)?)
    }

    /// Subscribe to writes made through other handles.
    #[must_use]
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            receiver: self.shared.changes.subscribe(),
            handle: self.handle,
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No subscribers is fine.
        let _ = self.shared.changes.send(StorageChange {
            key: key.to_string(),
            new_value,
            source: self.handle,
        });
    }
}

/// Stream of [`StorageChange`]s from other handles.
#[derive(Debug)]
pub struct StorageEvents {
    receiver: broadcast::Receiver<StorageChange>,
    handle: u64,
}

impl StorageEvents {
    /// Next change from another handle; `None` once every handle is dropped.
    ///
    /// Changes missed because the subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.source == self.handle => {}
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Storage change subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_storage() -> LocalStorage {
    let dir = std::env::temp_dir().join(format!("insight-storage-{}", uuid::Uuid::new_v4()));
    #[allow(clippy::unwrap_used)]
    LocalStorage::open(dir).unwrap()
}
