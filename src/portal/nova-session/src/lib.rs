//! # Nova Session
//!
//! Persists the signed-in portal and identifier, and keeps every mounted
//! consumer of that identifier current.
//!
//! ## Change propagation
//!
//! There is no single owner of the live identifier. Each mounted
//! [`PortalProvider`] observes the same persisted state through three
//! channels that all feed one idempotent update rule ([`reconcile`]):
//!
//! - explicit broadcast on the in-process [`ChangeBus`] after every write
//! - storage events from other tabs, relayed by [`CrossTabRelay`]
//! - a polling fallback that re-reads the store on a fixed interval
//!
//! Because the rule only replaces a value that differs, the channels may
//! fire in any order, or several times for one write.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod crosstab;
pub mod error;
pub mod guard;
pub mod provider;
pub mod signin;
pub mod store;

pub use bus::{reconcile, ChangeBus, ChangeEvent};
pub use config::SessionConfig;
pub use crosstab::CrossTabRelay;
pub use error::SessionError;
pub use guard::{decide, GuardDecision, RouteGuard};
pub use provider::{IdentifierHandle, PortalProvider};
pub use signin::{SignInFlow, SignInOutcome};
pub use store::{SessionRecord, SessionStore};
