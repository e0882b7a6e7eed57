//! # Shellmesh Authorization
//!
//! Session claims and role-based gating for the shellmesh composition runtime.
//!
//! ## Features
//!
//! - **Role derivation** from identity-provider groups via a static mapping table
//! - **Claims store** with an explicit `Uninitialized → Loading → Authenticated/Unauthenticated`
//!   state machine and change notifications over `tokio::sync::watch`
//! - **Token decoding** of the claims segment of a signed session token
//! - **Authorization context** handed to every loaded remote module
//!
//! ## Example
//!
//! ```rust
//! use shellmesh_authz::{ClaimsStore, Claims, GroupRoleMapping, token};
//! use std::sync::Arc;
//!
//! let store = Arc::new(ClaimsStore::new(GroupRoleMapping::default()));
//!
//! let claims = Claims::new("user-42", i64::MAX)
//!     .with_name("Alice")
//!     .with_group("trading-desk");
//! let raw = token::encode_unsigned(&claims).unwrap();
//!
//! assert!(store.login(&raw));
//! assert!(store.has_role("trader"));
//!
//! let ctx = store.auth_context();
//! assert!(ctx.has_any_role(["admin", "trader"]));
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod gate;
pub mod identity;
pub mod roles;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::AuthContext;
pub use error::{AuthzError, Result};
pub use gate::{authorize, AccessDecision};
pub use identity::{IdentityProvider, MockIdentityProvider, StaticTokenProvider};
pub use roles::{derive_roles, GroupRoleMapping};
pub use store::{ClaimsStore, Session, SessionState};
pub use types::{Claims, GroupId, GroupSet, RoleId, RoleSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
