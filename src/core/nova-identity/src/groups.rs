//! Group membership discovery.
//!
//! Identity providers put group membership in different places depending on
//! how the application is registered. Discovery runs an ordered list of
//! [`GroupSource`] strategies and takes the first one that matches.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::claims::ClaimsDocument;

/// Name of the claim carrying group membership.
pub const GROUPS_FIELD: &str = "groups";

/// Unordered set of group labels. An absent set is modeled as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GroupSet(BTreeSet<String>);

impl GroupSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a JSON array, ignoring non-string members.
    ///
    /// Returns `None` if `value` is not an array.
    pub fn from_json_array(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    /// Returns true if `label` is a member (exact, case-sensitive match).
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for GroupSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for GroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{label}")?;
        }
        write!(f, "]")
    }
}

/// Inputs available to group discovery after sign-in.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    /// The decoded identity token.
    pub token: &'a ClaimsDocument,
    /// The user-info document, if the endpoint answered.
    pub user_info: Option<&'a ClaimsDocument>,
}

impl<'a> Evidence<'a> {
    /// Evidence from a token alone.
    pub fn token_only(token: &'a ClaimsDocument) -> Self {
        Self {
            token,
            user_info: None,
        }
    }
}

/// A single group discovery strategy.
pub trait GroupSource: Send + Sync {
    /// Stable name used in logs and sign-in outcomes.
    fn name(&self) -> &'static str;

    /// Returns the groups this strategy finds, or `None` for no match.
    fn discover(&self, evidence: &Evidence<'_>) -> Option<GroupSet>;
}

/// `groups` array at the top level of the decoded token.
///
/// An empty array still counts as a match.
#[derive(Debug, Default)]
pub struct TokenGroups;

impl GroupSource for TokenGroups {
    fn name(&self) -> &'static str {
        "token-groups"
    }

    fn discover(&self, evidence: &Evidence<'_>) -> Option<GroupSet> {
        evidence
            .token
            .get(GROUPS_FIELD)
            .and_then(GroupSet::from_json_array)
    }
}

/// `groups` array at the top level of the user-info document.
#[derive(Debug, Default)]
pub struct UserInfoGroups;

impl GroupSource for UserInfoGroups {
    fn name(&self) -> &'static str {
        "userinfo-groups"
    }

    fn discover(&self, evidence: &Evidence<'_>) -> Option<GroupSet> {
        evidence
            .user_info?
            .get(GROUPS_FIELD)
            .and_then(GroupSet::from_json_array)
    }
}

/// First `groups` array found anywhere in the decoded token.
///
/// Only a non-empty array counts.
#[derive(Debug, Default)]
pub struct TokenSearch;

impl GroupSource for TokenSearch {
    fn name(&self) -> &'static str {
        "token-search"
    }

    fn discover(&self, evidence: &Evidence<'_>) -> Option<GroupSet> {
        evidence
            .token
            .find_where(GROUPS_FIELD, Value::is_array)
            .and_then(GroupSet::from_json_array)
            .filter(|groups| !groups.is_empty())
    }
}

/// Operator-configured group set used when the token carries nothing.
#[derive(Debug)]
pub struct ConfiguredFallback(GroupSet);

impl ConfiguredFallback {
    /// Creates the strategy. An empty set never matches.
    pub fn new(groups: GroupSet) -> Self {
        Self(groups)
    }
}

impl GroupSource for ConfiguredFallback {
    fn name(&self) -> &'static str {
        "configured-fallback"
    }

    fn discover(&self, _evidence: &Evidence<'_>) -> Option<GroupSet> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }
}

/// Maps a user-info display name to a group.
///
/// This trusts a user-controlled attribute for authorization and exists
/// only for demo tenants whose provider does not emit groups. It must be
/// enabled explicitly and logs a warning every time it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsecureDisplayNameRule {
    /// Display name to match against `username` or `name`.
    pub display_name: String,
    /// Group granted on a match.
    pub group: String,
}

impl GroupSource for InsecureDisplayNameRule {
    fn name(&self) -> &'static str {
        "insecure-display-name"
    }

    fn discover(&self, evidence: &Evidence<'_>) -> Option<GroupSet> {
        let info = evidence.user_info?;
        let matched = ["username", "name"]
            .iter()
            .any(|field| info.get_str(field) == Some(self.display_name.as_str()));

        if !matched {
            return None;
        }

        warn!(
            display_name = %self.display_name,
            group = %self.group,
            "Granting group from display name (insecure fallback enabled)"
        );
        Some(std::iter::once(self.group.clone()).collect())
    }
}

/// Result of running discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// The groups found (empty if nothing matched).
    pub groups: GroupSet,
    /// Name of the strategy that matched, if any.
    pub source: Option<&'static str>,
}

/// Ordered list of discovery strategies.
pub struct GroupDiscovery {
    sources: Vec<Box<dyn GroupSource>>,
}

impl GroupDiscovery {
    /// Token field, user-info field, then a search of the whole token.
    pub fn standard() -> Self {
        Self {
            sources: vec![
                Box::new(TokenGroups),
                Box::new(UserInfoGroups),
                Box::new(TokenSearch),
            ],
        }
    }

    /// Creates a discovery chain from explicit strategies.
    pub fn from_sources(sources: Vec<Box<dyn GroupSource>>) -> Self {
        Self { sources }
    }

    /// Appends the configured emergency fallback.
    pub fn with_fallback(mut self, groups: GroupSet) -> Self {
        self.sources.push(Box::new(ConfiguredFallback::new(groups)));
        self
    }

    /// Appends the insecure display-name rule.
    pub fn with_insecure_display_name(mut self, rule: InsecureDisplayNameRule) -> Self {
        self.sources.push(Box::new(rule));
        self
    }

    /// Strategy names in evaluation order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Runs the strategies in order and returns the first match.
    pub fn discover(&self, evidence: &Evidence<'_>) -> Discovered {
        for source in &self.sources {
            if let Some(groups) = source.discover(evidence) {
                debug!(source = source.name(), groups = %groups, "Groups discovered");
                return Discovered {
                    groups,
                    source: Some(source.name()),
                };
            }
        }

        debug!("No group source matched");
        Discovered {
            groups: GroupSet::new(),
            source: None,
        }
    }
}

impl Default for GroupDiscovery {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for GroupDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupDiscovery")
            .field("sources", &self.source_names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ClaimsDocument {
        ClaimsDocument::from(value)
    }

    fn groups(labels: &[&str]) -> GroupSet {
        labels.iter().copied().collect()
    }

    #[test]
    fn test_token_groups_first() {
        let token = doc(json!({ "groups": ["admin"] }));
        let info = doc(json!({ "groups": ["Customers"] }));
        let evidence = Evidence {
            token: &token,
            user_info: Some(&info),
        };

        let found = GroupDiscovery::standard().discover(&evidence);
        assert_eq!(found.groups, groups(&["admin"]));
        assert_eq!(found.source, Some("token-groups"));
    }

    #[test]
    fn test_empty_token_array_still_matches() {
        let token = doc(json!({ "groups": [], "profile": { "groups": ["admin"] } }));
        let found = GroupDiscovery::standard().discover(&Evidence::token_only(&token));
        assert!(found.groups.is_empty());
        assert_eq!(found.source, Some("token-groups"));
    }

    #[test]
    fn test_user_info_second() {
        let token = doc(json!({ "sub": "abc" }));
        let info = doc(json!({ "groups": ["Employees"] }));
        let evidence = Evidence {
            token: &token,
            user_info: Some(&info),
        };

        let found = GroupDiscovery::standard().discover(&evidence);
        assert_eq!(found.groups, groups(&["Employees"]));
        assert_eq!(found.source, Some("userinfo-groups"));
    }

    #[test]
    fn test_nested_search_third() {
        let token = doc(json!({ "profile": { "groups": ["Employees"] } }));
        let found = GroupDiscovery::standard().discover(&Evidence::token_only(&token));
        assert_eq!(found.groups, groups(&["Employees"]));
        assert_eq!(found.source, Some("token-search"));
    }

    #[test]
    fn test_nested_empty_array_does_not_match() {
        let token = doc(json!({ "profile": { "groups": [] } }));
        let found = GroupDiscovery::standard().discover(&Evidence::token_only(&token));
        assert!(found.groups.is_empty());
        assert_eq!(found.source, None);
    }

    #[test]
    fn test_non_string_members_ignored() {
        let token = doc(json!({ "groups": ["admin", 7, null, { "x": 1 }] }));
        let found = GroupDiscovery::standard().discover(&Evidence::token_only(&token));
        assert_eq!(found.groups, groups(&["admin"]));
    }

    #[test]
    fn test_configured_fallback() {
        let token = ClaimsDocument::empty();
        let discovery = GroupDiscovery::standard().with_fallback(groups(&["Employees"]));
        let found = discovery.discover(&Evidence::token_only(&token));
        assert_eq!(found.groups, groups(&["Employees"]));
        assert_eq!(found.source, Some("configured-fallback"));
    }

    #[test]
    fn test_empty_fallback_never_matches() {
        let token = ClaimsDocument::empty();
        let discovery = GroupDiscovery::standard().with_fallback(GroupSet::new());
        let found = discovery.discover(&Evidence::token_only(&token));
        assert_eq!(found.source, None);
    }

    #[test]
    fn test_insecure_rule_disabled_by_default() {
        let token = ClaimsDocument::empty();
        let info = doc(json!({ "username": "Alice" }));
        let evidence = Evidence {
            token: &token,
            user_info: Some(&info),
        };

        let found = GroupDiscovery::standard().discover(&evidence);
        assert!(found.groups.is_empty());
    }

    #[test]
    fn test_insecure_rule_when_enabled() {
        let token = ClaimsDocument::empty();
        let info = doc(json!({ "name": "Alice" }));
        let evidence = Evidence {
            token: &token,
            user_info: Some(&info),
        };

        let discovery = GroupDiscovery::standard().with_insecure_display_name(
            InsecureDisplayNameRule {
                display_name: "Alice".into(),
                group: "Employees".into(),
            },
        );

        let found = discovery.discover(&evidence);
        assert_eq!(found.groups, groups(&["Employees"]));
        assert_eq!(found.source, Some("insecure-display-name"));
    }

    #[test]
    fn test_source_order() {
        let discovery = GroupDiscovery::standard()
            .with_fallback(groups(&["Customers"]))
            .with_insecure_display_name(InsecureDisplayNameRule {
                display_name: "Alice".into(),
                group: "Employees".into(),
            });

        assert_eq!(
            discovery.source_names(),
            vec![
                "token-groups",
                "userinfo-groups",
                "token-search",
                "configured-fallback",
                "insecure-display-name",
            ]
        );
    }
}
