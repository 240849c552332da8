//! Claims documents and field search.
//!
//! A claims document is the decoded payload of an identity token: an
//! arbitrarily nested JSON tree with no schema beyond the fields we look
//! for. The search here is the one place that walks that tree.

use serde_json::{Map, Value};

use crate::error::IdentityError;

/// Deepest mapping level the field search will enter.
///
/// The root mapping is level 0. Mappings nested deeper than this are not
/// searched, which keeps hostile documents from exhausting the stack.
pub const MAX_CLAIMS_DEPTH: usize = 64;

/// A decoded identity token (or user-info document).
///
/// Key order is the order the keys appeared in the source JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsDocument(Value);

impl ClaimsDocument {
    /// Creates an empty document (`{}`).
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidClaims`] if the text is not valid JSON.
    pub fn from_json(text: &str) -> Result<Self, IdentityError> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(|e| IdentityError::InvalidClaims(e.to_string()))
    }

    /// Returns the underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns a top-level field, without searching nested mappings.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a top-level string field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Searches the whole document for `name`. See [`find_field`].
    pub fn find(&self, name: &str) -> Option<&Value> {
        find_field(&self.0, name)
    }

    /// Searches the whole document for an acceptable `name`. See [`find_field_where`].
    pub fn find_where<P>(&self, name: &str, accept: P) -> Option<&Value>
    where
        P: Fn(&Value) -> bool,
    {
        find_field_where(&self.0, name, accept)
    }
}

impl Default for ClaimsDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for ClaimsDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<ClaimsDocument> for Value {
    fn from(doc: ClaimsDocument) -> Self {
        doc.0
    }
}

/// Returns the first value stored under `name` anywhere in `doc`.
///
/// A mapping's own keys are checked before any nested mapping is entered,
/// and nested mappings are entered in key order. Arrays are never entered.
/// `None` means the field is absent from the reachable tree.
pub fn find_field<'a>(doc: &'a Value, name: &str) -> Option<&'a Value> {
    find_field_where(doc, name, |_| true)
}

/// Like [`find_field`], but a value only counts as a hit if `accept`
/// returns true for it. Rejected values do not stop the search.
pub fn find_field_where<'a, P>(doc: &'a Value, name: &str, accept: P) -> Option<&'a Value>
where
    P: Fn(&Value) -> bool,
{
    search(doc, name, &accept, 0)
}

fn search<'a, P>(value: &'a Value, name: &str, accept: &P, depth: usize) -> Option<&'a Value>
where
    P: Fn(&Value) -> bool,
{
    let Value::Object(map) = value else {
        return None;
    };

    if depth > MAX_CLAIMS_DEPTH {
        return None;
    }

    if let Some(hit) = map.get(name).filter(|v| accept(v)) {
        return Some(hit);
    }

    map.values()
        .filter(|child| child.is_object())
        .find_map(|child| search(child, name, accept, depth + 1))
}
