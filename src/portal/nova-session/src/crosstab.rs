//! Relay from other tabs' storage writes onto the local change bus.
//!
//! A tab never receives storage events for its own writes; those reach
//! local consumers through the explicit broadcast in
//! [`SessionStore::set_identifier`]. This relay covers the opposite case:
//! writes made by other tabs sharing the medium.

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use nova_identity::PortalIdentifier;

use crate::bus::ChangeEvent;
use crate::store::{portal_for_key, SessionStore};

/// Background task forwarding identifier writes from other tabs.
///
/// Stops when dropped or when [`CrossTabRelay::stop`] completes.
#[derive(Debug)]
pub struct CrossTabRelay {
    task: Option<JoinHandle<()>>,
}

impl CrossTabRelay {
    /// Starts relaying for `store`.
    ///
    /// Returns `None` if the store's backend has no storage events; in that
    /// case providers only learn about other tabs' writes by polling.
    pub fn start(store: &SessionStore) -> Option<Self> {
        let mut events = store.backend().storage_events()?;
        let bus = store.bus().clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(portal) = portal_for_key(&event.key) else {
                    trace!(key = %event.key, "Ignoring storage event");
                    continue;
                };

                let identifier = event
                    .new_value
                    .and_then(|value| PortalIdentifier::new(value).ok());

                debug!(portal = %portal, origin = event.origin, "Relaying storage event");
                bus.publish(ChangeEvent { portal, identifier });
            }
            debug!("Storage event stream closed");
        });

        Some(Self { task: Some(task) })
    }

    /// Stops the relay and waits until it can no longer publish.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for CrossTabRelay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
