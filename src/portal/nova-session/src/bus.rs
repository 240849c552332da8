//! In-process change bus and the shared update rule.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use nova_identity::{PortalIdentifier, PortalKind};

/// Capacity of each per-portal channel.
const BUS_CAPACITY: usize = 32;

/// Announces that a portal's stored identifier was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Portal whose identifier changed.
    pub portal: PortalKind,
    /// New identifier, or `None` if it was removed.
    pub identifier: Option<PortalIdentifier>,
}

/// One publish/subscribe channel per portal kind.
///
/// Cloning shares the channels. Subscribers of one kind never see events
/// for another.
#[derive(Clone)]
pub struct ChangeBus {
    channels: Arc<HashMap<PortalKind, broadcast::Sender<ChangeEvent>>>,
}

impl ChangeBus {
    /// Creates a bus with a channel for every portal kind.
    pub fn new() -> Self {
        let channels = PortalKind::ALL
            .into_iter()
            .map(|kind| (kind, broadcast::channel(BUS_CAPACITY).0))
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    fn channel(&self, kind: PortalKind) -> &broadcast::Sender<ChangeEvent> {
        // Every kind gets a channel in `new`.
        &self.channels[&kind]
    }

    /// Publishes an event to the subscribers of its portal kind.
    ///
    /// Returns how many subscribers it reached. Zero is not an error.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let portal = event.portal;
        let reached = self.channel(portal).send(event).unwrap_or(0);
        trace!(portal = %portal, reached, "Change event published");
        reached
    }

    /// Subscribes to events for one portal kind.
    pub fn subscribe(&self, kind: PortalKind) -> broadcast::Receiver<ChangeEvent> {
        self.channel(kind).subscribe()
    }

    /// Number of live subscribers for a portal kind.
    pub fn receiver_count(&self, kind: PortalKind) -> usize {
        self.channel(kind).receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<_> = PortalKind::ALL
            .into_iter()
            .map(|kind| (kind, self.receiver_count(kind)))
            .collect();
        f.debug_struct("ChangeBus").field("receivers", &counts).finish()
    }
}

/// The update rule shared by every propagation channel.
///
/// `observed` is what a channel just saw for `kind` (`None` when the key is
/// absent, which means the portal default). Returns the value to replace
/// `current` with, or `None` if nothing changes. Applying the same
/// observation twice changes nothing the second time.
pub fn reconcile(
    kind: PortalKind,
    current: &PortalIdentifier,
    observed: Option<&PortalIdentifier>,
) -> Option<PortalIdentifier> {
    let next = observed
        .cloned()
        .unwrap_or_else(|| PortalIdentifier::default_for(kind));
    (next != *current).then_some(next)
}
