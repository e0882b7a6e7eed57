//! The embedding shell
//!
//! Owns the claims store, the loader and a set of named mount points. Each
//! mount point holds the outcome of its last load so one failing remote never
//! affects its siblings.
//!
//! ```text
//! start: validate ─▶ claims store ─▶ bootstrap shared scope ─▶ loader ─▶ resolve session
//!                                                                          │
//! claims change ──watch──▶ re-gate Ready mounts ◀──────────────────────────┘
//! expiry tick ──check_expiry──▶ claims change
//! ```

use crate::config::HostConfig;
use crate::error::{Result, ShellError};
use crate::retry::RetryPolicy;
use anyhow::Context;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shellmesh_authz::{
    authorize, AccessDecision, AuthContext, ClaimsStore, Clock, IdentityProvider, RoleSet,
    SessionState, SystemClock,
};
use shellmesh_federation::{
    ArtifactFetcher, HostLibrary, LoadError, LoaderMode, ManifestResolver, ManifestTransport,
    ModuleDescriptor, ModuleLoader, RenderableUnit, SharedScope,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Name under which the claims store is shared with remotes
pub const AUTHZ_LIBRARY: &str = "shellmesh-authz";

/// How often the session token is checked for expiry in the background
pub const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of the last load into a mount point
#[derive(Debug, Clone)]
pub enum MountState {
    Ready(RenderableUnit),
    /// The user lacks every role that would grant access
    Unauthorized { required: Vec<String> },
    Failed(ShellError),
}

impl MountState {
    pub fn is_ready(&self) -> bool {
        matches!(self, MountState::Ready(_))
    }

    pub fn unit(&self) -> Option<&RenderableUnit> {
        match self {
            MountState::Ready(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MountState::Ready(_) => "ready",
            MountState::Unauthorized { .. } => "unauthorized",
            MountState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
struct MountPoint {
    module: String,
    export_path: String,
    required: Vec<String>,
    state: MountState,
}

impl MountPoint {
    /// Roles that would grant access, if `roles` no longer satisfies this mount
    fn revoked_by(&self, roles: &RoleSet) -> Option<Vec<String>> {
        let unit = self.state.unit()?;
        for required in [self.required.as_slice(), unit.required_roles()] {
            if let AccessDecision::Denied { required } = authorize(required, roles) {
                return Some(required);
            }
        }
        None
    }
}

type Slots = Arc<RwLock<BTreeMap<String, MountPoint>>>;

/// Marker instance for libraries declared in configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredLibrary {
    pub name: String,
    pub version: String,
}

pub struct Shell {
    store: Arc<ClaimsStore>,
    loader: Arc<ModuleLoader>,
    slots: Slots,
    retry: RetryPolicy,
    load_timeout: Duration,
    watcher: JoinHandle<()>,
}

impl Shell {
    /// Build the shell and resolve the initial session
    ///
    /// The shared scope is bootstrapped before the loader exists, so no load
    /// can observe an empty scope.
    pub async fn start(
        config: &HostConfig,
        transport: Arc<dyn ManifestTransport>,
        fetcher: Arc<dyn ArtifactFetcher>,
        identity: &dyn IdentityProvider,
        libraries: &[HostLibrary],
    ) -> anyhow::Result<Self> {
        Self::start_with_clock(
            config,
            transport,
            fetcher,
            identity,
            libraries,
            Arc::new(SystemClock),
        )
        .await
    }

    /// [`start`](Self::start) with a custom time source for token expiry
    pub async fn start_with_clock(
        config: &HostConfig,
        transport: Arc<dyn ManifestTransport>,
        fetcher: Arc<dyn ArtifactFetcher>,
        identity: &dyn IdentityProvider,
        libraries: &[HostLibrary],
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid host configuration")?;

        let store = Arc::new(ClaimsStore::new(config.group_role_mapping()?).with_clock(clock));

        let scope = Arc::new(SharedScope::new(config.name.clone()));
        let mut shared = vec![HostLibrary::new(
            AUTHZ_LIBRARY,
            shellmesh_authz::VERSION,
            store.clone(),
        )];
        shared.extend(libraries.iter().cloned());
        shared.extend(config.shared_libraries.iter().map(|(name, version)| {
            HostLibrary::new(
                name.clone(),
                version.clone(),
                Arc::new(DeclaredLibrary {
                    name: name.clone(),
                    version: version.clone(),
                }),
            )
        }));
        scope.bootstrap(&shared);

        let resolver = Arc::new(ManifestResolver::new(config.manifest_url.clone(), transport));
        let loader = Arc::new(ModuleLoader::new(
            config.loader_mode(),
            resolver,
            fetcher,
            scope,
        ));

        let state = store.initialize(identity).await;
        info!(
            host = %config.name,
            mode = ?config.mode,
            session = state.label(),
            "shell started"
        );

        let slots: Slots = Arc::new(RwLock::new(BTreeMap::new()));
        let watcher = tokio::spawn(watch_session(
            store.clone(),
            store.subscribe(),
            slots.clone(),
        ));

        Ok(Self {
            store,
            loader,
            slots,
            retry: RetryPolicy::from_config(&config.retry),
            load_timeout: config.load_timeout(),
            watcher,
        })
    }

    pub fn store(&self) -> &Arc<ClaimsStore> {
        &self.store
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    /// Context handed to remotes on render
    pub fn auth_context(&self) -> AuthContext {
        self.store.check_expiry();
        self.store.auth_context()
    }

    /// Modules the current user may open
    pub async fn visible_modules(&self) -> Result<Vec<ModuleDescriptor>> {
        let roles = self.current_roles();
        match self.loader.mode() {
            LoaderMode::Manifest => Ok(self
                .loader
                .resolver()
                .visible_modules(&roles)
                .await
                .map_err(LoadError::from)?),
            LoaderMode::Development { locations } => {
                let mut modules: Vec<ModuleDescriptor> = locations
                    .iter()
                    .map(|(name, location)| ModuleDescriptor::new(name.clone(), location.clone()))
                    .collect();
                modules.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(modules)
            }
        }
    }

    /// Load `module`'s `export_path` into `slot`, replacing what was there
    pub async fn mount<S: AsRef<str>>(
        &self,
        slot: &str,
        module: &str,
        export_path: &str,
        required: &[S],
    ) -> MountState {
        let required: Vec<String> = required.iter().map(|r| r.as_ref().to_string()).collect();
        let state = self.attempt(slot, module, export_path, &required).await;

        let mut mount = MountPoint {
            module: module.to_string(),
            export_path: export_path.to_string(),
            required,
            state,
        };

        // Roles may have changed while the load was in flight
        let mut slots = self.slots.write();
        self.settle(slot, &mut mount);
        let state = mount.state.clone();
        slots.insert(slot.to_string(), mount);
        state
    }

    /// Re-run the load behind `slot` from the top
    pub async fn retry(&self, slot: &str) -> Result<MountState> {
        let mount = self
            .slots
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| ShellError::UnknownSlot(slot.to_string()))?;

        debug!(%slot, module = %mount.module, previous = mount.state.label(), "retrying mount");
        let state = self
            .attempt(slot, &mount.module, &mount.export_path, &mount.required)
            .await;

        let mut slots = self.slots.write();
        match slots.get_mut(slot) {
            Some(current) => {
                current.state = state;
                self.settle(slot, current);
                Ok(current.state.clone())
            }
            None => Ok(state),
        }
    }

    /// Remove a mount point
    pub fn unmount(&self, slot: &str) -> bool {
        self.slots.write().remove(slot).is_some()
    }

    pub fn state(&self, slot: &str) -> Option<MountState> {
        self.slots.read().get(slot).map(|mount| mount.state.clone())
    }

    /// Mount point names, sorted
    pub fn slots(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    /// Re-check every ready mount against the current roles
    ///
    /// Runs automatically on each session change. Returns the slots that
    /// became unauthorized.
    pub fn regate(&self) -> Vec<String> {
        regate(&self.slots, &self.current_roles())
    }

    /// View for `slot`: the component's output or a fallback for its state
    pub fn render(&self, slot: &str) -> Result<Value> {
        let state = self
            .state(slot)
            .ok_or_else(|| ShellError::UnknownSlot(slot.to_string()))?;

        let view = match state {
            MountState::Ready(unit) => match unit.render(&self.auth_context()) {
                Ok(view) => view,
                Err(e) => json!({
                    "slot": slot,
                    "error": { "kind": "render", "message": e.to_string(), "retryable": true },
                }),
            },
            MountState::Unauthorized { required } => json!({
                "slot": slot,
                "unauthorized": { "required": required },
            }),
            MountState::Failed(e) => json!({
                "slot": slot,
                "error": {
                    "kind": e.kind().map(|k| k.as_str()).unwrap_or("timeout"),
                    "message": e.to_string(),
                    "retryable": e.is_recoverable(),
                },
            }),
        };
        Ok(view)
    }

    async fn attempt(
        &self,
        slot: &str,
        module: &str,
        export_path: &str,
        required: &[String],
    ) -> MountState {
        let roles = self.current_roles();
        let roles = &roles;

        let result = self
            .retry
            .run(module, move |_| self.load_once(module, export_path, required, roles))
            .await;

        match result {
            Ok(unit) => {
                info!(%slot, %module, export = %export_path, "mounted");
                MountState::Ready(unit)
            }
            Err(ShellError::Load(LoadError::AuthorizationDenied { required, .. })) => {
                info!(%slot, %module, "mount not authorized");
                MountState::Unauthorized { required }
            }
            Err(e) => {
                error!(%slot, %module, error = %e, "mount failed");
                MountState::Failed(e)
            }
        }
    }

    async fn load_once(
        &self,
        module: &str,
        export_path: &str,
        required: &[String],
        roles: &RoleSet,
    ) -> Result<RenderableUnit> {
        let load = self.loader.load_module(module, export_path, required, roles);
        match tokio::time::timeout(self.load_timeout, load).await {
            Ok(result) => result.map_err(ShellError::from),
            Err(_) => {
                let abandoned = self.loader.abandon(module);
                warn!(
                    %module,
                    timeout_ms = self.load_timeout.as_millis() as u64,
                    abandoned,
                    "load timed out"
                );
                Err(ShellError::Timeout {
                    module: module.to_string(),
                    after_ms: self.load_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Roles of the session, after dropping it if its token has expired
    fn current_roles(&self) -> RoleSet {
        self.store.check_expiry();
        self.store.roles()
    }

    /// Downgrade a freshly loaded mount the current roles no longer allow
    ///
    /// Called with the slot table write-locked so the session watcher cannot
    /// re-gate in between.
    fn settle(&self, slot: &str, mount: &mut MountPoint) {
        if let Some(required) = mount.revoked_by(&self.current_roles()) {
            info!(%slot, module = %mount.module, "roles changed during load");
            mount.state = MountState::Unauthorized { required };
        }
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn regate(slots: &RwLock<BTreeMap<String, MountPoint>>, roles: &RoleSet) -> Vec<String> {
    let mut slots = slots.write();
    let mut revoked = Vec::new();

    for (name, mount) in slots.iter_mut() {
        if let Some(required) = mount.revoked_by(roles) {
            mount.state = MountState::Unauthorized { required };
            revoked.push(name.clone());
        }
    }

    if !revoked.is_empty() {
        info!(slots = ?revoked, "mounts revoked after role change");
    }
    revoked
}

async fn watch_session(
    store: Arc<ClaimsStore>,
    mut session: watch::Receiver<SessionState>,
    slots: Slots,
) {
    let mut expiry = tokio::time::interval(EXPIRY_CHECK_INTERVAL);
    expiry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let roles = session
                    .borrow_and_update()
                    .session()
                    .map(|s| s.roles.clone())
                    .unwrap_or_default();
                regate(&slots, &roles);
            }
            _ = expiry.tick() => {
                // A transition wakes the branch above
                store.check_expiry();
            }
        }
    }
}
