//! Static group to role mapping table

use crate::error::{AuthzError, Result};
use crate::types::{GroupId, RoleSet};
use std::collections::HashMap;

/// Built-in mapping from identity-provider groups to roles
pub const DEFAULT_GROUP_ROLES: &[(&str, &[&str])] = &[
    ("trading-desk", &["trader"]),
    ("platform-admins", &["admin", "trader", "compliance-officer"]),
    ("sales", &["sales-agent"]),
    ("compliance", &["compliance-officer", "kyc-reviewer"]),
    ("kyc-operations", &["kyc-reviewer"]),
    ("annuity-operations", &["annuity-ops", "sales-agent"]),
];

/// Group to role mapping
///
/// Immutable once built. Lookups are exact string matches on the group id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRoleMapping {
    table: HashMap<GroupId, RoleSet>,
}

impl GroupRoleMapping {
    /// Create an empty mapping (every derivation yields no roles)
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Build a mapping from `(group, roles)` pairs
    ///
    /// Repeated groups are merged.
    ///
    /// # Errors
    ///
    /// Returns an error if a group or role identifier is empty.
    pub fn from_pairs<I, G, R, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (G, R)>,
        G: Into<String>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table: HashMap<GroupId, RoleSet> = HashMap::new();

        for (group, roles) in pairs {
            let group = group.into();
            if group.is_empty() {
                return Err(AuthzError::InvalidMapping(
                    "Group identifier cannot be empty".to_string(),
                ));
            }

            let entry = table.entry(group.clone()).or_default();
            for role in roles {
                let role = role.into();
                if role.is_empty() {
                    return Err(AuthzError::InvalidMapping(format!(
                        "Group '{}' maps to an empty role",
                        group
                    )));
                }
                entry.insert(role);
            }
        }

        Ok(Self { table })
    }

    /// Derive the deduplicated union of roles for the given groups
    ///
    /// Pure and total: the iteration order of `groups` has no effect on the
    /// result and unknown groups are ignored.
    pub fn derive_roles<I, S>(&self, groups: I) -> RoleSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roles = RoleSet::new();
        for group in groups {
            if let Some(mapped) = self.table.get(group.as_ref()) {
                roles.extend(mapped.iter().cloned());
            }
        }
        roles
    }

    /// Roles granted by a single group
    pub fn roles_for_group(&self, group: &str) -> Option<&RoleSet> {
        self.table.get(group)
    }

    /// All mapped groups, sorted
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.table.keys().map(String::as_str).collect();
        groups.sort_unstable();
        groups
    }

    /// Every role that some group can yield
    pub fn known_roles(&self) -> RoleSet {
        self.table.values().flatten().cloned().collect()
    }

    /// Number of mapped groups
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the mapping has no entries
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for GroupRoleMapping {
    fn default() -> Self {
        let table = DEFAULT_GROUP_ROLES
            .iter()
            .map(|(group, roles)| {
                (
                    group.to_string(),
                    roles.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect();

        Self { table }
    }
}
