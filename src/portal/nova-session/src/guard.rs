//! Route guards for portal subtrees.

use nova_identity::{portal::ROOT_PATH, PortalKind};
use tracing::debug;

use crate::store::SessionStore;

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the requested portal.
    Allow,
    /// Send the user elsewhere.
    Redirect(&'static str),
}

/// Decides access to `requested` given the sign-in state.
///
/// Signed-out users and sessions without an active portal go to the root;
/// users on the wrong portal go to their own portal's base path.
pub fn decide(
    requested: PortalKind,
    authenticated: bool,
    active: Option<PortalKind>,
) -> GuardDecision {
    match active {
        _ if !authenticated => GuardDecision::Redirect(ROOT_PATH),
        None => GuardDecision::Redirect(ROOT_PATH),
        Some(active) if active == requested => GuardDecision::Allow,
        Some(active) => GuardDecision::Redirect(active.base_path()),
    }
}

/// Guard reading the active portal from the session store.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    store: SessionStore,
}

impl RouteGuard {
    /// Creates a guard over `store`.
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Checks access to `requested`.
    pub async fn check(&self, requested: PortalKind, authenticated: bool) -> GuardDecision {
        let active = self.store.active_portal().await;
        let decision = decide(requested, authenticated, active);
        debug!(requested = %requested, ?active, ?decision, "Route guard checked");
        decision
    }
}
