//! Manifest resolver with caching and request coalescing
//!
//! ```text
//! fetch_manifest ─▶ cached? ──yes──▶ return
//!                     │no
//!                     ▼
//!               in flight? ──yes──▶ join the pending request
//!                     │no
//!                     ▼
//!               start request, record as in flight
//!                     │
//!        ok: cache + clear marker    err: clear marker, every waiter gets the error
//! ```

use super::transport::ManifestTransport;
use super::types::{Manifest, ModuleDescriptor};
use crate::error::ManifestError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use shellmesh_authz::RoleSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type PendingFetch = Shared<BoxFuture<'static, Result<Arc<Manifest>, ManifestError>>>;

#[derive(Default)]
struct ResolverState {
    cached: Option<Arc<Manifest>>,
    in_flight: Option<PendingFetch>,
    /// Bumped by `clear_cache` so stale requests cannot repopulate the cache
    generation: u64,
}

/// Resolves logical module names through the manifest document
///
/// # Thread Safety
///
/// Shareable behind `Arc`. The lock only guards cache bookkeeping and is
/// never held across an await.
pub struct ManifestResolver {
    url: String,
    transport: Arc<dyn ManifestTransport>,
    state: Arc<Mutex<ResolverState>>,
    requests: Arc<AtomicU64>,
}

impl ManifestResolver {
    pub fn new(url: impl Into<String>, transport: Arc<dyn ManifestTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
            state: Arc::new(Mutex::new(ResolverState::default())),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Manifest URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the cached manifest, fetching it if needed
    ///
    /// Concurrent callers arriving while a fetch is in flight share its result.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Fetch`] on network failure or non-success status,
    /// [`ManifestError::Malformed`] when the document has no valid `remotes` map.
    pub async fn fetch_manifest(&self) -> Result<Arc<Manifest>, ManifestError> {
        let pending = {
            let mut state = self.state.lock();

            if let Some(manifest) = &state.cached {
                debug!("manifest cache hit");
                return Ok(manifest.clone());
            }

            match &state.in_flight {
                Some(pending) => {
                    debug!("joining in-flight manifest fetch");
                    pending.clone()
                }
                None => {
                    let pending = Self::fetch_and_store(
                        self.url.clone(),
                        self.transport.clone(),
                        self.state.clone(),
                        self.requests.clone(),
                        state.generation,
                    )
                    .boxed()
                    .shared();

                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Look up a single descriptor, fetching the manifest if none is cached
    pub async fn load_remote_config(
        &self,
        name: &str,
    ) -> Result<Option<ModuleDescriptor>, ManifestError> {
        let manifest = self.fetch_manifest().await?;
        Ok(manifest.get(name).cloned())
    }

    /// Descriptors the holder of `roles` may open
    pub async fn visible_modules(
        &self,
        roles: &RoleSet,
    ) -> Result<Vec<ModuleDescriptor>, ManifestError> {
        let manifest = self.fetch_manifest().await?;
        Ok(manifest.visible_to(roles).cloned().collect())
    }

    /// Drop the cached manifest and forget any in-flight request
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.in_flight = None;
        state.generation += 1;
        info!("manifest cache cleared");
    }

    /// Forget a pending request so the next call issues a new one
    ///
    /// Waiters already joined keep their result. Returns whether a request
    /// was pending.
    pub fn abandon_in_flight(&self) -> bool {
        let mut state = self.state.lock();
        if state.in_flight.take().is_none() {
            return false;
        }
        state.generation += 1;
        warn!("abandoned in-flight manifest fetch");
        true
    }

    /// Currently cached manifest, without fetching
    pub fn cached(&self) -> Option<Arc<Manifest>> {
        self.state.lock().cached.clone()
    }

    /// Whether a fetch is currently pending
    pub fn is_fetching(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Number of network requests issued so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn fetch_and_store(
        url: String,
        transport: Arc<dyn ManifestTransport>,
        state: Arc<Mutex<ResolverState>>,
        requests: Arc<AtomicU64>,
        generation: u64,
    ) -> Result<Arc<Manifest>, ManifestError> {
        requests.fetch_add(1, Ordering::Relaxed);
        let result = Self::fetch_once(&url, transport.as_ref()).await.map(Arc::new);

        let mut guard = state.lock();
        if guard.generation != generation {
            debug!("discarding manifest fetched before cache was cleared");
            return result;
        }

        guard.in_flight = None;
        match &result {
            Ok(manifest) => {
                info!(
                    version = %manifest.version,
                    remotes = manifest.len(),
                    "manifest loaded"
                );
                guard.cached = Some(manifest.clone());
            }
            Err(e) => warn!(error = %e, "manifest fetch failed"),
        }

        result
    }

    async fn fetch_once(
        url: &str,
        transport: &dyn ManifestTransport,
    ) -> Result<Manifest, ManifestError> {
        let response = transport
            .get(url)
            .await
            .map_err(|reason| ManifestError::Fetch {
                url: url.to_string(),
                status: None,
                reason,
            })?;

        if !response.is_success() {
            return Err(ManifestError::Fetch {
                url: url.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
            });
        }

        Manifest::parse(&response.body)
    }
}
