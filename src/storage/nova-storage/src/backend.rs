//! Storage backend trait and storage-change notifications.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::StorageError;

/// Identifies one tab (browsing context) attached to a shared medium.
pub type TabId = u64;

/// A change to a key, as seen by tabs other than the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// Value before the change.
    pub old_value: Option<String>,
    /// Value after the change (`None` when removed).
    pub new_value: Option<String>,
    /// Tab that performed the write.
    pub origin: TabId,
}

/// Stream of storage events written by *other* tabs.
///
/// Events originating from the subscribing tab are skipped: a tab never
/// observes its own writes through this stream.
#[derive(Debug)]
pub struct StorageEvents {
    tab: TabId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageEvents {
    /// Wraps a receiver on behalf of `tab`.
    pub fn new(tab: TabId, rx: broadcast::Receiver<StorageEvent>) -> Self {
        Self { tab, rx }
    }

    /// Waits for the next foreign event.
    ///
    /// Returns `None` once the medium is gone. If the receiver fell behind,
    /// the missed events are dropped and reception continues; polling
    /// catches up with whatever was lost.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(tab = self.tab, missed, "Storage event stream lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Session storage backend.
///
/// Values are strings. A missing key is `Ok(None)`, not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Put a value with a key.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value by key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List keys with a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Subscribes to writes made by other tabs sharing this medium.
    ///
    /// Backends without change notifications return `None`; consumers
    /// then rely on polling alone.
    fn storage_events(&self) -> Option<StorageEvents> {
        None
    }
}
