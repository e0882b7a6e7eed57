//! Authorization context handed to loaded remote modules
//!
//! A remote receives this as its only input. It is a snapshot of the session
//! at the time it was built plus a logout callback wired to the host's store.

use crate::gate;
use crate::types::{Claims, GroupSet, RoleSet};
use std::fmt;
use std::sync::Arc;

type LogoutFn = Arc<dyn Fn() + Send + Sync>;

/// Session view exposed to remotes
#[derive(Clone)]
pub struct AuthContext {
    claims: Option<Claims>,
    roles: RoleSet,
    groups: GroupSet,
    logout: LogoutFn,
}

impl AuthContext {
    pub fn new(claims: Option<Claims>, roles: RoleSet, logout: LogoutFn) -> Self {
        let groups = claims
            .as_ref()
            .map(|c| c.groups.clone())
            .unwrap_or_default();

        Self {
            claims,
            roles,
            groups,
            logout,
        }
    }

    /// Context for a signed-out user; logout is a no-op
    pub fn anonymous() -> Self {
        Self::new(None, RoleSet::new(), Arc::new(|| {}))
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn groups(&self) -> &GroupSet {
        &self.groups
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        gate::has_role(&self.roles, role)
    }

    pub fn has_any_role<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        gate::has_any_role(&self.roles, roles)
    }

    pub fn has_all_roles<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        gate::has_all_roles(&self.roles, roles)
    }

    /// End the host session
    pub fn logout(&self) {
        (self.logout)()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("sub", &self.claims.as_ref().map(|c| c.sub.as_str()))
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}
