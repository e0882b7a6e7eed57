//! Group to role derivation
//!
//! Roles are never stored on their own: they are a pure projection of the
//! session's group memberships through a static [`GroupRoleMapping`].
//!
//! # Features
//!
//! - **Many-to-many**: one group may yield several roles, several groups may
//!   yield overlapping roles
//! - **Deduplicated union**: results are a [`RoleSet`](crate::RoleSet)
//! - **Total**: unknown groups contribute nothing and never fail
//!
//! # Example
//!
//! ```rust
//! use shellmesh_authz::roles::GroupRoleMapping;
//!
//! let mapping = GroupRoleMapping::default();
//! let roles = mapping.derive_roles(["platform-admins", "unknown-group"]);
//!
//! assert!(roles.contains("admin"));
//! assert!(roles.contains("trader"));
//! ```

pub mod mapping;

#[cfg(test)]
mod tests;

pub use mapping::{GroupRoleMapping, DEFAULT_GROUP_ROLES};

use crate::types::RoleSet;
use std::sync::OnceLock;

/// Derive roles through the built-in mapping table
pub fn derive_roles<I, S>(groups: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    static DEFAULT: OnceLock<GroupRoleMapping> = OnceLock::new();
    DEFAULT.get_or_init(GroupRoleMapping::default).derive_roles(groups)
}
