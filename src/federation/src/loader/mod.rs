//! Authorized remote module loader
//!
//! ```text
//! load_module(name, export, required, roles)
//!     │
//!     ├─ authorize(required, roles) ──denied──▶ AuthorizationDenied (no I/O)
//!     ├─ resolve location: manifest descriptor | development table
//!     ├─ unit cached for the same location and roles? ──yes──▶ return
//!     ├─ fetch + init(scope), one pending future per location
//!     ├─ container.get(export) ──none──▶ ExportNotFound
//!     └─ factory() ──▶ RenderableUnit
//! ```
//!
//! Failed fetches and initializations are not cached: the next call for the
//! same location starts over. A caller that gives up on a hung load calls
//! [`ModuleLoader::abandon`] so the next call does not rejoin it.

mod unit;

#[cfg(test)]
mod tests;

pub use unit::RenderableUnit;

use crate::container::{ArtifactFetcher, RemoteContainer};
use crate::error::LoadError;
use crate::manifest::ManifestResolver;
use crate::scope::SharedScope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use shellmesh_authz::{authorize, AccessDecision, RoleSet};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type PendingContainer = Shared<BoxFuture<'static, Result<Arc<dyn RemoteContainer>, LoadError>>>;

/// How logical names are turned into remote entry locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderMode {
    /// Look names up in the fetched manifest
    Manifest,
    /// Fixed name-to-location table, no manifest traffic
    Development { locations: HashMap<String, String> },
}

impl LoaderMode {
    pub fn development<I, K, V>(locations: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LoaderMode::Development {
            locations: locations
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, LoaderMode::Development { .. })
    }
}

struct Resolved {
    location: String,
    required_roles: Vec<String>,
}

/// Loads remote exports on demand, gated by the caller's roles
///
/// Loaded units are cached by `(module, export_path)`; containers are cached
/// by location so two names pointing at one artifact fetch it once.
pub struct ModuleLoader {
    mode: LoaderMode,
    resolver: Arc<ManifestResolver>,
    fetcher: Arc<dyn ArtifactFetcher>,
    scope: Arc<SharedScope>,
    containers: DashMap<String, PendingContainer>,
    units: DashMap<(String, String), RenderableUnit>,
}

impl ModuleLoader {
    pub fn new(
        mode: LoaderMode,
        resolver: Arc<ManifestResolver>,
        fetcher: Arc<dyn ArtifactFetcher>,
        scope: Arc<SharedScope>,
    ) -> Self {
        Self {
            mode,
            resolver,
            fetcher,
            scope,
            containers: DashMap::new(),
            units: DashMap::new(),
        }
    }

    pub fn mode(&self) -> &LoaderMode {
        &self.mode
    }

    pub fn resolver(&self) -> &Arc<ManifestResolver> {
        &self.resolver
    }

    pub fn scope(&self) -> &Arc<SharedScope> {
        &self.scope
    }

    /// Load `export_path` from module `name`
    ///
    /// Authorization runs before any network activity. In manifest mode the
    /// descriptor's own `requiredRoles` are enforced as well.
    ///
    /// # Errors
    ///
    /// Every failure is reported as a [`LoadError`]; see
    /// [`LoadError::kind`] for the categories a host can branch on.
    pub async fn load_module<S: AsRef<str>>(
        &self,
        name: &str,
        export_path: &str,
        required_roles: &[S],
        current_roles: &RoleSet,
    ) -> Result<RenderableUnit, LoadError> {
        Self::check_access(name, required_roles, current_roles)?;

        if !self.scope.is_initialized() {
            warn!(module = %name, "load attempted before shared scope bootstrap");
            return Err(LoadError::Initialization {
                module: name.to_string(),
                reason: "shared scope has not been bootstrapped".to_string(),
            });
        }

        let resolved = match self.resolve(name, current_roles).await {
            Ok(resolved) => resolved,
            Err(e @ LoadError::ModuleNotRegistered(_)) => {
                self.evict(name);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let key = (name.to_string(), export_path.to_string());
        let cached = self.units.get(&key).map(|unit| unit.value().clone());
        if let Some(unit) = cached {
            if unit.location() == resolved.location
                && unit.required_roles() == resolved.required_roles.as_slice()
            {
                debug!(module = %name, export = %export_path, "module served from cache");
                return Ok(unit);
            }
            info!(
                module = %name,
                export = %export_path,
                previous = %unit.location(),
                location = %resolved.location,
                "manifest entry changed, reloading"
            );
            self.units.remove(&key);
        }

        let container = self.container_for(name, &resolved.location).await?;

        let factory = match container.get(export_path).await {
            Some(factory) => factory,
            None => {
                warn!(module = %name, export = %export_path, "export not exposed by remote");
                return Err(LoadError::ExportNotFound {
                    module: name.to_string(),
                    export_path: export_path.to_string(),
                });
            }
        };

        let component = factory().await.map_err(|e| {
            warn!(module = %name, export = %export_path, error = %e, "export factory failed");
            LoadError::Initialization {
                module: name.to_string(),
                reason: format!("export '{}' failed to build: {:#}", export_path, e),
            }
        })?;

        let unit = RenderableUnit::new(
            name,
            export_path,
            resolved.location,
            resolved.required_roles,
            component,
        );
        self.units.insert(key, unit.clone());

        info!(module = %name, export = %export_path, location = %unit.location(), "module loaded");
        Ok(unit)
    }

    /// Whether `(name, export_path)` has a cached unit
    pub fn is_loaded(&self, name: &str, export_path: &str) -> bool {
        self.units
            .contains_key(&(name.to_string(), export_path.to_string()))
    }

    /// Locations with a container fetched or in flight, sorted
    pub fn loaded_locations(&self) -> Vec<String> {
        let mut locations: Vec<String> =
            self.containers.iter().map(|e| e.key().clone()).collect();
        locations.sort();
        locations
    }

    /// Forget every unit of module `name` and the containers behind them
    ///
    /// Returns how many units were dropped.
    pub fn evict(&self, name: &str) -> usize {
        let keys: Vec<(String, String)> = self
            .units
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, unit)) = self.units.remove(&key) {
                self.containers.remove(unit.location());
                removed += 1;
            }
        }

        if removed > 0 {
            info!(module = %name, units = removed, "module evicted");
        }
        removed
    }

    /// Forget the unfinished load of module `name`
    ///
    /// Drops a container fetch that has not completed and, while the manifest
    /// itself is still being fetched, the pending manifest request. Callers
    /// already waiting keep their result; the next load starts from the top.
    /// Returns whether anything was dropped.
    pub fn abandon(&self, name: &str) -> bool {
        let location = match &self.mode {
            LoaderMode::Development { locations } => locations.get(name).cloned(),
            LoaderMode::Manifest => match self.resolver.cached() {
                Some(manifest) => manifest.get(name).map(|d| d.url.clone()),
                None => return self.resolver.abandon_in_flight(),
            },
        };

        let Some(location) = location else {
            return false;
        };

        let dropped = self
            .containers
            .remove_if(&location, |_, pending| pending.peek().is_none())
            .is_some();
        if dropped {
            warn!(module = %name, %location, "abandoned unfinished remote load");
        }
        dropped
    }

    /// Drop all cached units and containers
    pub fn clear(&self) {
        self.units.clear();
        self.containers.clear();
        info!("loader cache cleared");
    }

    fn check_access<S: AsRef<str>>(
        name: &str,
        required_roles: &[S],
        current_roles: &RoleSet,
    ) -> Result<(), LoadError> {
        match authorize(required_roles, current_roles) {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Denied { required } => {
                // Denial is an expected outcome
                info!(module = %name, required = ?required, "module access denied");
                Err(LoadError::AuthorizationDenied {
                    module: name.to_string(),
                    required,
                })
            }
        }
    }

    async fn resolve(&self, name: &str, current_roles: &RoleSet) -> Result<Resolved, LoadError> {
        match &self.mode {
            LoaderMode::Development { locations } => {
                let location = locations
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LoadError::ModuleNotRegistered(name.to_string()))?;
                debug!(module = %name, %location, "resolved from development table");
                Ok(Resolved {
                    location,
                    required_roles: Vec::new(),
                })
            }
            LoaderMode::Manifest => {
                let descriptor = self
                    .resolver
                    .load_remote_config(name)
                    .await?
                    .ok_or_else(|| {
                        warn!(module = %name, "module missing from manifest");
                        LoadError::ModuleNotRegistered(name.to_string())
                    })?;

                Self::check_access(name, descriptor.required_roles.as_slice(), current_roles)?;
                debug!(module = %name, location = %descriptor.url, "resolved from manifest");
                Ok(Resolved {
                    location: descriptor.url,
                    required_roles: descriptor.required_roles,
                })
            }
        }
    }

    async fn container_for(
        &self,
        name: &str,
        location: &str,
    ) -> Result<Arc<dyn RemoteContainer>, LoadError> {
        let pending = match self.containers.entry(location.to_string()) {
            Entry::Occupied(existing) => {
                debug!(module = %name, %location, "reusing remote container");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let pending = Self::fetch_and_init(
                    name.to_string(),
                    location.to_string(),
                    self.fetcher.clone(),
                    self.scope.clone(),
                )
                .boxed()
                .shared();
                slot.insert(pending.clone());
                pending
            }
        };

        let result = pending.clone().await;
        if result.is_err() {
            // Only drop our own attempt; a retry may already have replaced it
            self.containers
                .remove_if(location, |_, current| current.ptr_eq(&pending));
        }
        result
    }

    async fn fetch_and_init(
        module: String,
        location: String,
        fetcher: Arc<dyn ArtifactFetcher>,
        scope: Arc<SharedScope>,
    ) -> Result<Arc<dyn RemoteContainer>, LoadError> {
        debug!(%module, %location, "fetching remote entry");
        let container = fetcher.fetch(&location).await.map_err(|e| {
            warn!(%module, %location, error = %e, "remote entry fetch failed");
            LoadError::Fetch {
                module: module.clone(),
                location: location.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        container.init(scope.view()).await.map_err(|e| {
            warn!(%module, %location, error = %e, "remote initialization failed");
            LoadError::Initialization {
                module: module.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        info!(%module, %location, shared = scope.len(), "remote initialized");
        Ok(container)
    }
}
