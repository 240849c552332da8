//! Identity error types.

use thiserror::Error;

/// Errors raised at the edges of identity resolution.
///
/// Resolution itself never fails; these only surface when parsing
/// external input such as stored values or claims files.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A stored or user-supplied portal name is not one of the known kinds.
    #[error("unknown portal kind: {0}")]
    UnknownPortal(String),

    /// Identifiers must not be empty.
    #[error("portal identifier cannot be empty")]
    EmptyIdentifier,

    /// A claims document could not be parsed.
    #[error("invalid claims document: {0}")]
    InvalidClaims(String),
}
