//! Authorization predicate and role queries
//!
//! A module's required-role set is satisfied when it is empty or when the
//! user holds at least one of its roles.

use crate::types::{RoleId, RoleSet};

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The user may proceed
    Granted,
    /// The user holds none of the required roles
    Denied {
        /// Roles that would have granted access
        required: Vec<RoleId>,
    },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

/// Check `required` against the user's `current` roles
///
/// Granted iff `required` is empty or the two sets intersect.
pub fn authorize<S: AsRef<str>>(required: &[S], current: &RoleSet) -> AccessDecision {
    if required.is_empty() || has_any_role(current, required) {
        return AccessDecision::Granted;
    }

    AccessDecision::Denied {
        required: required.iter().map(|r| r.as_ref().to_string()).collect(),
    }
}

/// Whether `roles` contains `role`
pub fn has_role(roles: &RoleSet, role: &str) -> bool {
    roles.contains(role)
}

/// Whether `roles` contains at least one of `wanted` (false when `wanted` is empty)
pub fn has_any_role<I, S>(roles: &RoleSet, wanted: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    wanted.into_iter().any(|r| roles.contains(r.as_ref()))
}

/// Whether `roles` contains every one of `wanted` (true when `wanted` is empty)
pub fn has_all_roles<I, S>(roles: &RoleSet, wanted: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    wanted.into_iter().all(|r| roles.contains(r.as_ref()))
}
