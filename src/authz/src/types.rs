//! Core session types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role identifier (e.g. "trader", "kyc-reviewer")
pub type RoleId = String;

/// Identity-provider group identifier
pub type GroupId = String;

/// Deduplicated, ordered set of roles
pub type RoleSet = BTreeSet<RoleId>;

/// Deduplicated, ordered set of groups
pub type GroupSet = BTreeSet<GroupId>;

/// Decoded identity assertion for the current session
///
/// Claims are replaced wholesale; there is no API for editing a live value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub sub: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// Group memberships
    #[serde(default)]
    pub groups: GroupSet,

    /// Issued-at (seconds since epoch)
    #[serde(default)]
    pub iat: i64,

    /// Expiry (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    /// Create claims for a subject expiring at `exp` (seconds since epoch)
    pub fn new(sub: impl Into<String>, exp: i64) -> Self {
        Self {
            sub: sub.into(),
            name: String::new(),
            email: String::new(),
            groups: GroupSet::new(),
            iat: 0,
            exp,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Add a group membership
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Set the issued-at timestamp
    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = iat;
        self
    }

    /// Expiry as a UTC timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Whether the claims are expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}
