//! Remote container contract
//!
//! Every remote exposes the same two operations at its resolved location:
//! `init(scope)` binds it to the host's shared libraries, and `get(path)`
//! returns a zero-argument factory for one of its exports.
//!
//! How the container itself is obtained from a location is the job of an
//! [`ArtifactFetcher`]. [`StaticArtifactFetcher`] serves containers linked
//! into the host binary; other fetchers can load plugins from disk or over
//! the network behind the same trait.

use crate::scope::ScopeView;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use shellmesh_authz::AuthContext;
use std::sync::Arc;
use tracing::debug;

/// A mountable unit exported by a remote
pub trait RemoteComponent: Send + Sync {
    /// Produce the component's view for the given session
    fn render(&self, ctx: &AuthContext) -> anyhow::Result<serde_json::Value>;
}

/// Factory returned by [`RemoteContainer::get`]
pub type ExportFactory =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<dyn RemoteComponent>>> + Send + Sync>;

/// Build a factory that always yields `component`
pub fn export_factory(component: Arc<dyn RemoteComponent>) -> ExportFactory {
    Arc::new(move || {
        let component = component.clone();
        async move { Ok::<_, anyhow::Error>(component) }.boxed()
    })
}

/// Entry point of a loaded remote
#[async_trait]
pub trait RemoteContainer: Send + Sync {
    /// Bind to the host's shared libraries
    async fn init(&self, scope: ScopeView) -> anyhow::Result<()>;

    /// Factory for `export_path`, or `None` when not exposed
    async fn get(&self, export_path: &str) -> Option<ExportFactory>;
}

/// Obtains the container living at a location
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> anyhow::Result<Arc<dyn RemoteContainer>>;
}

/// Catalog of containers compiled into the host, keyed by location
#[derive(Default)]
pub struct StaticArtifactFetcher {
    catalog: DashMap<String, Arc<dyn RemoteContainer>>,
}

impl StaticArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, location: impl Into<String>, container: Arc<dyn RemoteContainer>) -> Self {
        self.register(location, container);
        self
    }

    pub fn register(&self, location: impl Into<String>, container: Arc<dyn RemoteContainer>) {
        let location = location.into();
        debug!(%location, "registering static remote");
        self.catalog.insert(location, container);
    }

    /// Registered locations, sorted
    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.catalog.iter().map(|e| e.key().clone()).collect();
        locations.sort();
        locations
    }
}

#[async_trait]
impl ArtifactFetcher for StaticArtifactFetcher {
    async fn fetch(&self, location: &str) -> anyhow::Result<Arc<dyn RemoteContainer>> {
        self.catalog
            .get(location)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow::anyhow!("no remote entry artifact at {}", location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockComponent, MockContainer};

    #[tokio::test]
    async fn test_static_fetcher_lookup() {
        let container = Arc::new(MockContainer::new().with_export("./App", MockComponent::new("app")));
        let fetcher = StaticArtifactFetcher::new().with("https://cdn/app/remoteEntry.js", container);

        assert!(fetcher.fetch("https://cdn/app/remoteEntry.js").await.is_ok());
        let err = fetcher.fetch("https://cdn/other/remoteEntry.js").await.err().unwrap();
        assert!(err.to_string().contains("no remote entry artifact"));
        assert_eq!(fetcher.locations(), vec!["https://cdn/app/remoteEntry.js"]);
    }

    #[tokio::test]
    async fn test_export_factory_yields_same_component() {
        let component: Arc<dyn RemoteComponent> = Arc::new(MockComponent::new("app"));
        let factory = export_factory(component.clone());

        let first = factory().await.unwrap();
        let second = factory().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &component));
    }
}
