//! Session store: the persisted portal and identifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use nova_identity::{PortalIdentifier, PortalKind};
use nova_storage::StorageBackend;

use crate::bus::{ChangeBus, ChangeEvent};
use crate::error::SessionError;

/// Key holding the active portal kind.
pub const ACTIVE_PORTAL_KEY: &str = "portalUser";

/// Prefix of the per-portal identifier keys.
pub const IDENTIFIER_KEY_PREFIX: &str = "userDbId_";

/// Storage key of the identifier for `kind`.
pub fn identifier_key(kind: PortalKind) -> String {
    format!("{IDENTIFIER_KEY_PREFIX}{kind}")
}

/// Portal kind whose identifier lives under `key`, if any.
pub fn portal_for_key(key: &str) -> Option<PortalKind> {
    key.strip_prefix(IDENTIFIER_KEY_PREFIX)?.parse().ok()
}

/// Snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// Active portal, if someone signed in.
    pub active_portal: Option<PortalKind>,
    /// Stored identifier per portal kind.
    pub identifiers: BTreeMap<PortalKind, PortalIdentifier>,
}

/// Keyed access to the session medium.
///
/// Reads never fail: a backend error or an unparseable value is logged and
/// read as absent. Every identifier write or removal is announced on the
/// store's [`ChangeBus`] once the backend accepted it.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    bus: ChangeBus,
}

impl SessionStore {
    /// Creates a store over `backend` with a fresh change bus.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            bus: ChangeBus::new(),
        }
    }

    /// The change bus writes are announced on.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Session read failed, treating as absent");
                None
            },
        }
    }

    /// Records the portal the user signed into.
    pub async fn set_active_portal(&self, kind: PortalKind) -> Result<(), SessionError> {
        self.backend.put(ACTIVE_PORTAL_KEY, kind.as_str()).await?;
        debug!(portal = %kind, "Active portal stored");
        Ok(())
    }

    /// Returns the active portal, if one is stored and valid.
    pub async fn active_portal(&self) -> Option<PortalKind> {
        let stored = self.read(ACTIVE_PORTAL_KEY).await?;
        match stored.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!(value = %stored, error = %e, "Ignoring unknown stored portal");
                None
            },
        }
    }

    /// Stores the identifier for `kind` and announces it.
    pub async fn set_identifier(
        &self,
        kind: PortalKind,
        identifier: &PortalIdentifier,
    ) -> Result<(), SessionError> {
        self.backend
            .put(&identifier_key(kind), identifier.as_str())
            .await?;

        let reached = self.bus.publish(ChangeEvent {
            portal: kind,
            identifier: Some(identifier.clone()),
        });
        debug!(portal = %kind, identifier = %identifier, reached, "Identifier stored");
        Ok(())
    }

    /// Returns the stored identifier for `kind`, keeping backend failures
    /// apart from an absent key.
    ///
    /// # Errors
    ///
    /// [`SessionError::Storage`] if the backend read fails.
    pub async fn try_identifier(
        &self,
        kind: PortalKind,
    ) -> Result<Option<PortalIdentifier>, SessionError> {
        let stored = self.backend.get(&identifier_key(kind)).await?;
        // An empty stored value counts as absent.
        Ok(stored.and_then(|value| PortalIdentifier::new(value).ok()))
    }

    /// Returns the stored identifier for `kind`, if any.
    pub async fn identifier(&self, kind: PortalKind) -> Option<PortalIdentifier> {
        match self.try_identifier(kind).await {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(portal = %kind, error = %e, "Identifier read failed, treating as absent");
                None
            },
        }
    }

    /// Returns the stored identifier for `kind`, or the portal default.
    pub async fn identifier_or_default(&self, kind: PortalKind) -> PortalIdentifier {
        self.identifier(kind)
            .await
            .unwrap_or_else(|| PortalIdentifier::default_for(kind))
    }

    /// Signs `kind` out: removes its identifier and the active portal, and
    /// announces the removal.
    pub async fn clear(&self, kind: PortalKind) -> Result<(), SessionError> {
        self.backend.delete(&identifier_key(kind)).await?;
        self.backend.delete(ACTIVE_PORTAL_KEY).await?;

        self.bus.publish(ChangeEvent {
            portal: kind,
            identifier: None,
        });
        info!(portal = %kind, "Session cleared");
        Ok(())
    }

    /// Reads the whole session.
    pub async fn record(&self) -> SessionRecord {
        let mut identifiers = BTreeMap::new();
        for kind in PortalKind::ALL {
            if let Some(identifier) = self.identifier(kind).await {
                identifiers.insert(kind, identifier);
            }
        }

        SessionRecord {
            active_portal: self.active_portal().await,
            identifiers,
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
