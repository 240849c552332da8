//! # Nova Storage
//!
//! Session-scoped key/value storage for Nova portals.
//!
//! Provides the backend trait, the storage-event stream used for
//! cross-tab notifications, and an in-memory session area shared by tabs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::{StorageBackend, StorageEvent, StorageEvents, TabId};
pub use error::StorageError;
pub use memory::{SessionArea, TabStorage};
