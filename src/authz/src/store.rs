//! Token/claims store
//!
//! Holds the single current session and publishes every state transition.
//!
//! ```text
//! Uninitialized ──begin_loading──▶ Loading ──restore(valid)──▶ Authenticated
//!                                     │                            │
//!                                     └──restore(none/bad)──▶ Unauthenticated ◀──logout/expiry──┘
//! ```
//!
//! Roles are derived once per session from its groups, so every reader sees
//! claims and roles that belong together.

use crate::clock::{Clock, SystemClock};
use crate::context::AuthContext;
use crate::gate;
use crate::identity::IdentityProvider;
use crate::roles::GroupRoleMapping;
use crate::token;
use crate::types::{Claims, GroupSet, RoleSet};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// An authenticated session: raw token, decoded claims and derived roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub claims: Claims,
    pub roles: RoleSet,
}

/// Store state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated(Arc<Session>),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}

/// Holder of the current session
///
/// Never returns errors: unreadable or expired tokens degrade to
/// [`SessionState::Unauthenticated`].
pub struct ClaimsStore {
    mapping: Arc<GroupRoleMapping>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SessionState>,
}

impl ClaimsStore {
    /// Create a store in the `Uninitialized` state
    pub fn new(mapping: GroupRoleMapping) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            mapping: Arc::new(mapping),
            clock: Arc::new(SystemClock),
            state,
        }
    }

    /// Use a custom time source for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Resolve the session from an identity provider
    pub async fn initialize(&self, provider: &dyn IdentityProvider) -> SessionState {
        self.begin_loading();
        let token = provider.current_token().await;
        self.restore(token.as_deref());
        self.state()
    }

    /// Enter `Loading`
    pub fn begin_loading(&self) {
        self.publish(SessionState::Loading);
    }

    /// Establish the session from a token, if any
    ///
    /// Returns whether the store ended up authenticated.
    pub fn restore(&self, raw: Option<&str>) -> bool {
        let Some(raw) = raw else {
            debug!("no session token present");
            self.publish(SessionState::Unauthenticated);
            return false;
        };

        match self.build_session(raw) {
            Ok(session) => {
                info!(
                    sub = %session.claims.sub,
                    roles = session.roles.len(),
                    "session established"
                );
                self.publish(SessionState::Authenticated(Arc::new(session)));
                true
            }
            Err(e) => {
                warn!(error = %e, "session token rejected");
                self.publish(SessionState::Unauthenticated);
                false
            }
        }
    }

    /// Replace the session wholesale with a new token
    pub fn login(&self, raw: &str) -> bool {
        self.restore(Some(raw))
    }

    /// Clear the session
    pub fn logout(&self) {
        if self.state.borrow().is_authenticated() {
            info!("session ended by logout");
        }
        self.publish(SessionState::Unauthenticated);
    }

    /// Drop the session if its token has expired
    ///
    /// Returns true if this call ended the session.
    pub fn check_expiry(&self) -> bool {
        let expired = match &*self.state.borrow() {
            SessionState::Authenticated(session) => {
                session.claims.is_expired_at(self.clock.now())
            }
            _ => false,
        };

        if expired {
            info!("session token expired");
            self.publish(SessionState::Unauthenticated);
        }
        expired
    }

    /// Claims of the current session
    pub fn claims(&self) -> Option<Claims> {
        self.state.borrow().session().map(|s| s.claims.clone())
    }

    /// Roles of the current session (empty when signed out)
    pub fn roles(&self) -> RoleSet {
        self.state
            .borrow()
            .session()
            .map(|s| s.roles.clone())
            .unwrap_or_default()
    }

    /// Groups of the current session (empty when signed out)
    pub fn groups(&self) -> GroupSet {
        self.state
            .borrow()
            .session()
            .map(|s| s.claims.groups.clone())
            .unwrap_or_default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.with_roles(|roles| gate::has_role(roles, role))
    }

    pub fn has_any_role<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_roles(|current| gate::has_any_role(current, roles))
    }

    pub fn has_all_roles<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_roles(|current| gate::has_all_roles(current, roles))
    }

    /// Snapshot of the session for a remote module, with logout wired back here
    pub fn auth_context(self: &Arc<Self>) -> AuthContext {
        let store: Weak<Self> = Arc::downgrade(self);
        let logout = Arc::new(move || {
            if let Some(store) = store.upgrade() {
                store.logout();
            }
        });

        match self.state.borrow().session() {
            Some(session) => {
                AuthContext::new(Some(session.claims.clone()), session.roles.clone(), logout)
            }
            None => AuthContext::new(None, RoleSet::new(), logout),
        }
    }

    /// The mapping used for role derivation
    pub fn mapping(&self) -> &GroupRoleMapping {
        &self.mapping
    }

    fn build_session(&self, raw: &str) -> crate::Result<Session> {
        let claims = token::decode(raw)?;
        if claims.is_expired_at(self.clock.now()) {
            return Err(crate::AuthzError::TokenExpired(claims.exp));
        }

        let roles = self.mapping.derive_roles(&claims.groups);
        Ok(Session {
            token: raw.to_string(),
            claims,
            roles,
        })
    }

    fn with_roles<T>(&self, f: impl FnOnce(&RoleSet) -> T) -> T {
        let state = self.state.borrow();
        match state.session() {
            Some(session) => f(&session.roles),
            None => f(&RoleSet::new()),
        }
    }

    fn publish(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        debug!(from = previous.label(), to = self.state.borrow().label(), "session state");
    }
}

impl Default for ClaimsStore {
    fn default() -> Self {
        Self::new(GroupRoleMapping::default())
    }
}
