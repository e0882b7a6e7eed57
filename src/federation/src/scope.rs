//! Shared runtime scope
//!
//! Process-wide table of host-owned library instances, keyed by
//! `(name, version)`. Remotes bind to these instead of bringing their own
//! copies, so every loaded module runs against one instance of each core
//! library.
//!
//! Access goes through a double indirection: [`SharedEntry::get`] resolves to
//! a factory, and invoking the factory resolves to the instance.
//!
//! The table must be bootstrapped before the first module load. Remotes only
//! ever see a [`ScopeView`], which has no mutating operations.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A host-owned library instance
pub type SharedLibrary = Arc<dyn Any + Send + Sync>;

/// Zero-argument factory resolving to a shared library instance
pub type SharedFactory = Box<dyn FnOnce() -> BoxFuture<'static, SharedLibrary> + Send>;

/// A library the host exposes to remotes
#[derive(Clone)]
pub struct HostLibrary {
    pub name: String,
    pub version: String,
    pub instance: SharedLibrary,
}

impl HostLibrary {
    pub fn new<T>(name: impl Into<String>, version: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            version: version.into(),
            instance,
        }
    }
}

impl std::fmt::Debug for HostLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLibrary")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// One registered `(name, version)` pair
#[derive(Clone)]
pub struct SharedEntry {
    name: String,
    version: String,
    from: String,
    instance: SharedLibrary,
}

impl SharedEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Host that registered this entry
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Resolve the factory for this library
    pub async fn get(&self) -> SharedFactory {
        let instance = self.instance.clone();
        Box::new(move || async move { instance }.boxed())
    }

    /// Resolve through both indirections to the instance
    pub async fn resolve(&self) -> SharedLibrary {
        let factory = self.get().await;
        factory().await
    }

    /// Resolve and downcast to a concrete type
    pub async fn resolve_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve().await.downcast::<T>().ok()
    }

    /// Whether this entry and `other` share the same instance
    pub fn same_instance(&self, other: &SharedEntry) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

/// Registry of shared host libraries
pub struct SharedScope {
    host: String,
    entries: DashMap<(String, String), SharedEntry>,
    initialized: AtomicBool,
}

impl SharedScope {
    /// Create an empty scope owned by `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            entries: DashMap::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Register the host's libraries and mark the scope ready
    ///
    /// Idempotent: pairs already present are left untouched, so repeated calls
    /// never create duplicate or conflicting entries. Returns how many entries
    /// this call added.
    pub fn bootstrap(&self, libraries: &[HostLibrary]) -> usize {
        let added = libraries
            .iter()
            .filter(|library| self.register((*library).clone()))
            .count();

        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(host = %self.host, entries = self.entries.len(), "shared scope initialized");
        } else {
            debug!(added, "shared scope bootstrap repeated");
        }

        added
    }

    /// Register a single library unless its `(name, version)` is already present
    pub fn register(&self, library: HostLibrary) -> bool {
        match self.entries.entry((library.name.clone(), library.version.clone())) {
            Entry::Occupied(_) => {
                debug!(name = %library.name, version = %library.version, "shared library already registered");
                false
            }
            Entry::Vacant(slot) => {
                debug!(name = %library.name, version = %library.version, "registering shared library");
                slot.insert(SharedEntry {
                    name: library.name,
                    version: library.version,
                    from: self.host.clone(),
                    instance: library.instance,
                });
                true
            }
        }
    }

    /// Whether `bootstrap` has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn get(&self, name: &str, version: &str) -> Option<SharedEntry> {
        self.entries
            .get(&(name.to_string(), version.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Registered versions of a library, sorted
    pub fn versions(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == name)
            .map(|entry| entry.key().1.clone())
            .collect();
        versions.sort();
        versions
    }

    /// All `(name, version)` keys, sorted
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> =
            self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Read-only handle given to remotes during initialization
    pub fn view(self: &Arc<Self>) -> ScopeView {
        ScopeView {
            scope: Arc::clone(self),
        }
    }
}

/// Read-only view of a [`SharedScope`]
#[derive(Clone)]
pub struct ScopeView {
    scope: Arc<SharedScope>,
}

impl ScopeView {
    pub fn get(&self, name: &str, version: &str) -> Option<SharedEntry> {
        self.scope.get(name, version)
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    pub fn versions(&self, name: &str) -> Vec<String> {
        self.scope.versions(name)
    }

    pub fn len(&self) -> usize {
        self.scope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_empty()
    }
}
