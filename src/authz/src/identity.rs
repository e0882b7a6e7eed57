//! Identity provider boundary
//!
//! The redirect-based sign-in flow lives outside shellmesh. All the runtime
//! needs from it is the current signed token, if there is one.

use crate::clock::{Clock, SystemClock};
use crate::token;
use crate::types::Claims;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

/// Supplies the current session token
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed token for the current session, or `None` when signed out
    async fn current_token(&self) -> Option<String>;
}

/// Token handed over by the embedding environment
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn current_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Issues unsigned tokens for a fixed mock user
///
/// Used when the host runs with mock auth; every call mints a fresh token
/// valid for `ttl` from the clock's current time.
pub struct MockIdentityProvider {
    template: Claims,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MockIdentityProvider {
    pub fn new(template: Claims) -> Self {
        Self {
            template,
            ttl: Duration::hours(8),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn current_token(&self) -> Option<String> {
        let now = self.clock.now();
        let mut claims = self.template.clone();
        claims.iat = now.timestamp();
        claims.exp = (now + self.ttl).timestamp();

        match token::encode_unsigned(&claims) {
            Ok(token) => {
                debug!(sub = %claims.sub, "issued mock session token");
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "failed to mint mock session token");
                None
            }
        }
    }
}
