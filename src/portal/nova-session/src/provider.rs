//! Portal context providers.
//!
//! A provider owns the live identifier of one portal kind for as long as it
//! is mounted. It never writes to the store; it only follows it.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use nova_identity::{PortalIdentifier, PortalKind};

use crate::bus::{reconcile, ChangeEvent};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::store::SessionStore;

/// Shortest accepted polling period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read-only view of a provider's live identifier.
#[derive(Debug, Clone)]
pub struct IdentifierHandle {
    kind: PortalKind,
    rx: watch::Receiver<PortalIdentifier>,
}

impl IdentifierHandle {
    /// Portal kind this handle follows.
    pub fn kind(&self) -> PortalKind {
        self.kind
    }

    /// The identifier right now.
    pub fn current(&self) -> PortalIdentifier {
        self.rx.borrow().clone()
    }

    /// Waits until the identifier changes.
    ///
    /// # Errors
    ///
    /// [`SessionError::ProviderUnmounted`] once the provider is gone.
    pub async fn changed(&mut self) -> Result<(), SessionError> {
        self.rx
            .changed()
            .await
            .map_err(|_| SessionError::ProviderUnmounted)
    }
}

/// A mounted provider for one portal kind.
///
/// Dropping it only requests cancellation of its task, which may still run
/// until its next await point. [`PortalProvider::unmount`] is the point after
/// which no update can happen.
#[derive(Debug)]
pub struct PortalProvider {
    kind: PortalKind,
    live: watch::Receiver<PortalIdentifier>,
    task: Option<JoinHandle<()>>,
}

impl PortalProvider {
    /// Mounts a provider for `kind`.
    ///
    /// Subscribes to the bus first, then seeds from the store (or the portal
    /// default), so a write landing in between is still seen.
    pub async fn mount(kind: PortalKind, store: &SessionStore, config: &SessionConfig) -> Self {
        let events = store.bus().subscribe(kind);
        let seed = store.identifier_or_default(kind).await;
        debug!(portal = %kind, identifier = %seed, "Provider mounted");

        let (tx, live) = watch::channel(seed);
        let period = config.poll_interval.max(MIN_POLL_INTERVAL);
        let task = tokio::spawn(follow(kind, store.clone(), events, tx, period));

        Self {
            kind,
            live,
            task: Some(task),
        }
    }

    /// Mounts the customer portal provider.
    pub async fn mount_customer(store: &SessionStore, config: &SessionConfig) -> Self {
        Self::mount(PortalKind::Customer, store, config).await
    }

    /// Mounts the employee portal provider.
    pub async fn mount_employee(store: &SessionStore, config: &SessionConfig) -> Self {
        Self::mount(PortalKind::Employee, store, config).await
    }

    /// Portal kind of this provider.
    pub fn kind(&self) -> PortalKind {
        self.kind
    }

    /// The live identifier right now.
    pub fn current(&self) -> PortalIdentifier {
        self.live.borrow().clone()
    }

    /// A handle for descendants.
    pub fn handle(&self) -> IdentifierHandle {
        IdentifierHandle {
            kind: self.kind,
            rx: self.live.clone(),
        }
    }

    /// Unmounts and waits for the task to finish.
    ///
    /// After this returns the provider is unsubscribed from the bus and its
    /// timer is gone.
    pub async fn unmount(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        debug!(portal = %self.kind, "Provider unmounted");
    }
}

impl Drop for PortalProvider {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn follow(
    kind: PortalKind,
    store: SessionStore,
    mut events: broadcast::Receiver<ChangeEvent>,
    tx: watch::Sender<PortalIdentifier>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let observed = tokio::select! {
            received = events.recv() => match received {
                Ok(event) => Some(event.identifier),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(portal = %kind, skipped, "Provider lagged, re-reading store");
                    reread(&store, kind).await
                },
                Err(RecvError::Closed) => return,
            },
            _ = ticker.tick() => {
                trace!(portal = %kind, "Poll tick");
                reread(&store, kind).await
            },
        };

        // A failed read says nothing about the key; keep the current value.
        let Some(observed) = observed else {
            continue;
        };

        tx.send_if_modified(|current| match reconcile(kind, current, observed.as_ref()) {
            Some(next) => {
                debug!(portal = %kind, from = %current, to = %next, "Identifier changed");
                *current = next;
                true
            },
            None => false,
        });
    }
}

/// Re-reads the stored identifier. `None` means the read itself failed.
async fn reread(store: &SessionStore, kind: PortalKind) -> Option<Option<PortalIdentifier>> {
    match store.try_identifier(kind).await {
        Ok(identifier) => Some(identifier),
        Err(e) => {
            warn!(portal = %kind, error = %e, "Store read failed, keeping current identifier");
            None
        },
    }
}
