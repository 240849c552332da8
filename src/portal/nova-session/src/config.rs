//! Session configuration.

use std::time::Duration;

use nova_identity::{GroupDiscovery, GroupSet, InsecureDisplayNameRule};

/// How often providers re-read the store when no other channel fired.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runtime settings for sign-in and providers.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Polling fallback period for mounted providers.
    pub poll_interval: Duration,
    /// Emergency group set used when neither token nor user info has groups.
    pub fallback_groups: GroupSet,
    /// Display-name → group rule. Off unless explicitly set.
    pub insecure_display_name: Option<InsecureDisplayNameRule>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_groups: GroupSet::new(),
            insecure_display_name: None,
        }
    }
}

impl SessionConfig {
    /// Builds the group discovery chain these settings describe.
    pub fn discovery(&self) -> GroupDiscovery {
        let mut discovery = GroupDiscovery::standard();
        if !self.fallback_groups.is_empty() {
            discovery = discovery.with_fallback(self.fallback_groups.clone());
        }
        if let Some(rule) = &self.insecure_display_name {
            discovery = discovery.with_insecure_display_name(rule.clone());
        }
        discovery
    }
}
