//! # Nova Identity
//!
//! Decides which portal a signed-in user belongs to and which identifier
//! scopes their data inside that portal.
//!
//! Everything in this crate is synchronous and pure:
//! - Claims search over decoded identity tokens
//! - Ordered group discovery strategies
//! - Portal classification from group membership
//! - Identifier resolution with per-portal defaults

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod error;
pub mod groups;
pub mod portal;
pub mod resolver;

pub use claims::{find_field, find_field_where, ClaimsDocument, MAX_CLAIMS_DEPTH};
pub use error::IdentityError;
pub use groups::{
    Discovered, Evidence, GroupDiscovery, GroupSet, GroupSource, InsecureDisplayNameRule,
};
pub use portal::{home_path, resolve_portal, PortalKind};
pub use resolver::{resolve_identifier, PortalIdentifier};
