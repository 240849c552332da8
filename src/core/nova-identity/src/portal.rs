//! Portal kinds and classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IdentityError;
use crate::groups::GroupSet;

/// Group label granting the admin portal.
pub const ADMIN_GROUP: &str = "admin";
/// Group label granting the employee portal.
pub const EMPLOYEE_GROUP: &str = "Employees";
/// Group label granting the customer portal.
pub const CUSTOMER_GROUP: &str = "Customers";

/// Public landing route, used when no portal is active.
pub const ROOT_PATH: &str = "/";

/// One of the three user-facing portals.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PortalKind {
    /// Back-office administration.
    Admin,
    /// Staff portal.
    Employee,
    /// Policy holder portal (and the default on ambiguity).
    #[default]
    Customer,
}

impl PortalKind {
    /// All portal kinds, in classification precedence order.
    pub const ALL: [PortalKind; 3] = [PortalKind::Admin, PortalKind::Employee, PortalKind::Customer];

    /// Stored and displayed name of the portal.
    pub fn as_str(self) -> &'static str {
        match self {
            PortalKind::Admin => "admin",
            PortalKind::Employee => "employee",
            PortalKind::Customer => "customer",
        }
    }

    /// Route prefix of the portal.
    pub fn base_path(self) -> &'static str {
        match self {
            PortalKind::Admin => "/admin",
            PortalKind::Employee => "/employee",
            PortalKind::Customer => "/customer",
        }
    }

    /// Identifier used when none can be resolved or none is stored.
    pub fn default_identifier(self) -> &'static str {
        match self {
            PortalKind::Admin => "A_001",
            PortalKind::Employee => "E_001",
            PortalKind::Customer => "C_002",
        }
    }

    /// Group label that selects this portal.
    pub fn group_label(self) -> &'static str {
        match self {
            PortalKind::Admin => ADMIN_GROUP,
            PortalKind::Employee => EMPLOYEE_GROUP,
            PortalKind::Customer => CUSTOMER_GROUP,
        }
    }
}

impl fmt::Display for PortalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortalKind {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortalKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| IdentityError::UnknownPortal(s.to_string()))
    }
}

/// Picks the portal for a group set.
///
/// `admin` beats `Employees`, which beats `Customers`. A set with none of
/// them (including the empty set) lands on the customer portal.
pub fn resolve_portal(groups: &GroupSet) -> PortalKind {
    let matched = PortalKind::ALL
        .into_iter()
        .find(|kind| groups.contains(kind.group_label()));

    match matched {
        Some(kind) => {
            debug!(portal = %kind, groups = %groups, "Portal resolved from groups");
            kind
        },
        None => {
            debug!(groups = %groups, "No portal group matched, defaulting to customer");
            PortalKind::default()
        },
    }
}

/// Where the home route sends a user.
pub fn home_path(active: Option<PortalKind>) -> &'static str {
    active.unwrap_or_default().base_path()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn groups(labels: &[&str]) -> GroupSet {
        labels.iter().copied().collect()
    }

    #[test]
    fn test_single_group() {
        assert_eq!(resolve_portal(&groups(&["admin"])), PortalKind::Admin);
        assert_eq!(resolve_portal(&groups(&["Employees"])), PortalKind::Employee);
        assert_eq!(resolve_portal(&groups(&["Customers"])), PortalKind::Customer);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            resolve_portal(&groups(&["Customers", "Employees", "admin"])),
            PortalKind::Admin
        );
        assert_eq!(
            resolve_portal(&groups(&["Customers", "Employees"])),
            PortalKind::Employee
        );
    }

    #[test]
    fn test_default_customer() {
        assert_eq!(resolve_portal(&GroupSet::new()), PortalKind::Customer);
        assert_eq!(resolve_portal(&groups(&["Everyone"])), PortalKind::Customer);
    }

    #[test]
    fn test_labels_case_sensitive() {
        assert_eq!(resolve_portal(&groups(&["Admin"])), PortalKind::Customer);
        assert_eq!(resolve_portal(&groups(&["employees"])), PortalKind::Customer);
    }

    #[test]
    fn test_parse_roundtrip_names() {
        for kind in PortalKind::ALL {
            assert_eq!(kind.as_str().parse::<PortalKind>().unwrap(), kind);
        }
        assert!(matches!(
            "root".parse::<PortalKind>(),
            Err(IdentityError::UnknownPortal(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PortalKind::Employee).unwrap();
        assert_eq!(json, "\"employee\"");
    }

    #[test]
    fn test_base_paths() {
        assert_eq!(PortalKind::Admin.base_path(), "/admin");
        assert_eq!(PortalKind::Employee.base_path(), "/employee");
        assert_eq!(PortalKind::Customer.base_path(), "/customer");
    }

    #[test]
    fn test_home_path() {
        assert_eq!(home_path(Some(PortalKind::Employee)), "/employee");
        assert_eq!(home_path(None), "/customer");
    }

    fn other_label() -> impl Strategy<Value = String> {
        "[A-Za-z]{1,12}".prop_filter("known portal label", |s| {
            s != ADMIN_GROUP && s != EMPLOYEE_GROUP && s != CUSTOMER_GROUP
        })
    }

    proptest! {
        #[test]
        fn prop_admin_always_wins(
            others in proptest::collection::vec(any::<String>(), 0..8),
            with_employees in any::<bool>(),
            with_customers in any::<bool>(),
        ) {
            let mut labels = others;
            labels.push(ADMIN_GROUP.to_string());
            if with_employees {
                labels.push(EMPLOYEE_GROUP.to_string());
            }
            if with_customers {
                labels.push(CUSTOMER_GROUP.to_string());
            }
            let set: GroupSet = labels.into_iter().collect();
            prop_assert_eq!(resolve_portal(&set), PortalKind::Admin);
        }

        #[test]
        fn prop_employees_beat_customers(others in proptest::collection::vec(other_label(), 0..8)) {
            let mut labels = others;
            labels.push(EMPLOYEE_GROUP.to_string());
            labels.push(CUSTOMER_GROUP.to_string());
            let set: GroupSet = labels.into_iter().collect();
            prop_assert_eq!(resolve_portal(&set), PortalKind::Employee);
        }

        #[test]
        fn prop_unknown_labels_default(labels in proptest::collection::vec(other_label(), 0..8)) {
            let set: GroupSet = labels.into_iter().collect();
            prop_assert_eq!(resolve_portal(&set), PortalKind::Customer);
        }
    }
}
