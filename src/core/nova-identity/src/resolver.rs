//! Portal identifier resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::claims::ClaimsDocument;
use crate::error::IdentityError;
use crate::portal::PortalKind;

/// Claim carrying the principal's row key.
pub const DB_ID_FIELD: &str = "db_id";

/// Identifies a signed-in principal within their portal kind.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortalIdentifier(String);

impl PortalIdentifier {
    /// Creates an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::EmptyIdentifier`] for an empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentityError::EmptyIdentifier);
        }
        Ok(Self(value))
    }

    /// The compiled default identifier for `kind`.
    pub fn default_for(kind: PortalKind) -> Self {
        Self(kind.default_identifier().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PortalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PortalIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PortalIdentifier {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortalIdentifier> for String {
    fn from(id: PortalIdentifier) -> Self {
        id.0
    }
}

impl PartialEq<str> for PortalIdentifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PortalIdentifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Coerces a claim value into identifier text.
///
/// Non-empty strings and non-zero numbers qualify; anything else is skipped
/// so the search keeps looking.
fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves the identifier for a principal signed into `kind`.
///
/// The admin portal has no per-user identifier and always gets its default.
/// Other portals use the first usable `db_id` anywhere in the claims, or
/// their default when there is none.
pub fn resolve_identifier(claims: &ClaimsDocument, kind: PortalKind) -> PortalIdentifier {
    if kind == PortalKind::Admin {
        debug!("Admin portal has no per-user identifier, using default");
        return PortalIdentifier::default_for(kind);
    }

    let found = claims
        .find_where(DB_ID_FIELD, |v| identifier_text(v).is_some())
        .and_then(identifier_text);

    match found {
        Some(text) => {
            debug!(portal = %kind, identifier = %text, "Identifier found in claims");
            PortalIdentifier(text)
        },
        None => {
            debug!(portal = %kind, "No db_id in claims, using default identifier");
            PortalIdentifier::default_for(kind)
        },
    }
}
