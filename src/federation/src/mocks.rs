// Mock infrastructure for loader and resolver testing
// Stand-ins for the network, remote containers and their exports

use crate::container::{export_factory, ArtifactFetcher, ExportFactory, RemoteComponent, RemoteContainer, StaticArtifactFetcher};
use crate::manifest::{ManifestTransport, TransportResponse};
use crate::scope::{ScopeView, SharedEntry};
use async_trait::async_trait;
use futures::future::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use shellmesh_authz::AuthContext;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Scripted manifest transport that records every request
pub struct MockManifestTransport {
    default_response: Mutex<TransportResponse>,
    queued: Mutex<VecDeque<Result<TransportResponse, String>>>,
    requests: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockManifestTransport {
    /// Respond `200` with `body` unless a scripted response is queued
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            default_response: Mutex::new(TransportResponse::new(200, body.into())),
            queued: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Respond with `status` and an empty body unless a response is queued
    pub fn failing_with(status: u16) -> Self {
        let transport = Self::new("");
        *transport.default_response.lock() = TransportResponse::new(status, Vec::new());
        transport
    }

    /// Hold every request until [`release`](Self::release) grants a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held requests complete
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Queue a one-shot response
    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.queued
            .lock()
            .push_back(Ok(TransportResponse::new(status, body.into())));
    }

    /// Queue a one-shot network failure
    pub fn push_error(&self, reason: impl Into<String>) {
        self.queued.lock().push_back(Err(reason.into()));
    }

    /// Replace the default response body (status 200)
    pub fn set_body(&self, body: impl Into<String>) {
        *self.default_response.lock() = TransportResponse::new(200, body.into());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ManifestTransport for MockManifestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, String> {
        self.requests.lock().push(url.to_string());

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| e.to_string())?;
            permit.forget();
        }

        let queued = self.queued.lock().pop_front();
        match queued {
            Some(response) => response,
            None => Ok(self.default_response.lock().clone()),
        }
    }
}

/// Component that renders a small JSON summary of its input
#[derive(Debug, Clone)]
pub struct MockComponent {
    label: String,
}

impl MockComponent {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl RemoteComponent for MockComponent {
    fn render(&self, ctx: &AuthContext) -> anyhow::Result<serde_json::Value> {
        Ok(json!({
            "component": self.label,
            "user": ctx.claims().map(|c| c.sub.clone()),
            "roles": ctx.roles(),
        }))
    }
}

/// Component whose render always fails
#[derive(Debug, Clone)]
pub struct FailingComponent {
    reason: String,
}

impl FailingComponent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RemoteComponent for FailingComponent {
    fn render(&self, _ctx: &AuthContext) -> anyhow::Result<serde_json::Value> {
        Err(anyhow::anyhow!("{}", self.reason))
    }
}

/// Component whose render panics
#[derive(Debug, Clone, Default)]
pub struct PanickingComponent;

impl RemoteComponent for PanickingComponent {
    fn render(&self, _ctx: &AuthContext) -> anyhow::Result<serde_json::Value> {
        panic!("component exploded")
    }
}

/// Container with configurable exports and init behaviour
#[derive(Default)]
pub struct MockContainer {
    exports: HashMap<String, Arc<dyn RemoteComponent>>,
    failing_factories: HashMap<String, String>,
    shared_requirements: Vec<(String, String)>,
    init_failure: Option<String>,
    init_calls: AtomicUsize,
    bound_scope: Mutex<Option<ScopeView>>,
}

impl MockContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export<C>(mut self, path: impl Into<String>, component: C) -> Self
    where
        C: RemoteComponent + 'static,
    {
        self.exports.insert(path.into(), Arc::new(component));
        self
    }

    /// Expose `path` with a factory that fails when invoked
    pub fn with_failing_factory(mut self, path: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failing_factories.insert(path.into(), reason.into());
        self
    }

    /// Fail `init` unless the scope provides `name@version`
    pub fn with_shared_requirement(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.shared_requirements.push((name.into(), version.into()));
        self
    }

    pub fn failing_init(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Library the container received during `init`
    pub fn bound_library(&self, name: &str, version: &str) -> Option<SharedEntry> {
        self.bound_scope
            .lock()
            .as_ref()
            .and_then(|scope| scope.get(name, version))
    }
}

#[async_trait]
impl RemoteContainer for MockContainer {
    async fn init(&self, scope: ScopeView) -> anyhow::Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.init_failure {
            anyhow::bail!("{}", reason);
        }

        for (name, version) in &self.shared_requirements {
            if !scope.contains(name, version) {
                anyhow::bail!(
                    "shared dependency {}@{} not provided (available: {:?})",
                    name,
                    version,
                    scope.versions(name)
                );
            }
        }

        *self.bound_scope.lock() = Some(scope);
        Ok(())
    }

    async fn get(&self, export_path: &str) -> Option<ExportFactory> {
        if let Some(reason) = self.failing_factories.get(export_path) {
            let reason = reason.clone();
            let factory: ExportFactory = Arc::new(move || {
                let reason = reason.clone();
                async move { Err::<Arc<dyn RemoteComponent>, _>(anyhow::anyhow!("{}", reason)) }.boxed()
            });
            return Some(factory);
        }

        self.exports
            .get(export_path)
            .map(|component| export_factory(component.clone()))
    }
}

/// Artifact fetcher over a static catalog that counts and can fail or hold fetches
#[derive(Default)]
pub struct MockArtifactFetcher {
    catalog: StaticArtifactFetcher,
    fetches: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, location: impl Into<String>, container: Arc<dyn RemoteContainer>) -> Self {
        self.catalog.register(location, container);
        self
    }

    /// Hold every fetch until [`release`](Self::release) grants a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Make the next fetch of `location` fail with `reason`
    pub fn fail_next(&self, location: impl Into<String>, reason: impl Into<String>) {
        self.failures
            .lock()
            .entry(location.into())
            .or_default()
            .push_back(reason.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    pub fn fetch_count_for(&self, location: &str) -> usize {
        self.fetches.lock().iter().filter(|l| *l == location).count()
    }
}

#[async_trait]
impl ArtifactFetcher for MockArtifactFetcher {
    async fn fetch(&self, location: &str) -> anyhow::Result<Arc<dyn RemoteContainer>> {
        self.fetches.lock().push(location.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }

        let failure = self
            .failures
            .lock()
            .get_mut(location)
            .and_then(VecDeque::pop_front);
        if let Some(reason) = failure {
            anyhow::bail!("{}", reason);
        }

        self.catalog.fetch(location).await
    }
}
