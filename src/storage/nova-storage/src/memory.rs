//! In-memory session area shared between tabs.
//!
//! A [`SessionArea`] is one storage medium. Each [`TabStorage`] opened on it
//! reads and writes the same entries, and every write is announced to the
//! other tabs through [`StorageEvents`], never to the writer itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::trace;

use crate::backend::{StorageBackend, StorageEvent, StorageEvents, TabId};
use crate::error::StorageError;

/// Capacity of the storage-event channel per subscriber.
const EVENT_CAPACITY: usize = 64;

struct AreaInner {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
}

/// A storage medium shared by any number of tabs.
#[derive(Clone)]
pub struct SessionArea {
    inner: Arc<AreaInner>,
}

impl SessionArea {
    /// Creates an empty area.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(AreaInner {
                entries: Mutex::new(HashMap::new()),
                events,
                next_tab: AtomicU64::new(1),
            }),
        }
    }

    /// Attaches a new tab to this area.
    pub fn open_tab(&self) -> TabStorage {
        let id = self.inner.next_tab.fetch_add(1, Ordering::Relaxed);
        TabStorage {
            id,
            area: self.clone(),
        }
    }
}

impl Default for SessionArea {
    fn default() -> Self {
        Self::new()
    }
}

/// One tab's view of a [`SessionArea`].
#[derive(Clone)]
pub struct TabStorage {
    id: TabId,
    area: SessionArea,
}

impl TabStorage {
    /// A tab on a fresh area of its own.
    pub fn isolated() -> Self {
        SessionArea::new().open_tab()
    }

    /// This tab's identifier.
    pub fn tab_id(&self) -> TabId {
        self.id
    }

    /// The area this tab is attached to.
    pub fn area(&self) -> &SessionArea {
        &self.area
    }

    fn announce(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.id,
        };
        // No subscribers is fine.
        let receivers = self.area.inner.events.send(event).unwrap_or(0);
        trace!(tab = self.id, key = %key, receivers, "Storage event sent");
    }
}

#[async_trait]
impl StorageBackend for TabStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.area.inner.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.area.inner.entries.lock().await;
        let old = entries.insert(key.to_string(), value.to_string());

        // Same value: browsers do not fire a storage event either.
        if old.as_deref() != Some(value) {
            self.announce(key, old, Some(value.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.area.inner.entries.lock().await;
        if let Some(old) = entries.remove(key) {
            self.announce(key, Some(old), None);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.area.inner.entries.lock().await;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn storage_events(&self) -> Option<StorageEvents> {
        Some(StorageEvents::new(
            self.id,
            self.area.inner.events.subscribe(),
        ))
    }
}
