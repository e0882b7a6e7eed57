//! Remotes linked into the host binary
//!
//! The CLI host cannot execute code fetched over the network, so the remotes
//! it can mount are registered here under `builtin://` locations.

use async_trait::async_trait;
use serde_json::json;
use shellmesh_authz::{AuthContext, ClaimsStore};
use shellmesh_federation::container::{export_factory, StaticArtifactFetcher};
use shellmesh_federation::{ExportFactory, RemoteComponent, RemoteContainer, ScopeView};
use std::sync::Arc;
use tracing::debug;

use crate::shell::AUTHZ_LIBRARY;

pub const SESSION_LOCATION: &str = "builtin://session/remoteEntry";

/// Renders who is signed in and what they may do
#[derive(Debug, Default)]
pub struct SessionPanel;

impl RemoteComponent for SessionPanel {
    fn render(&self, ctx: &AuthContext) -> anyhow::Result<serde_json::Value> {
        let claims = ctx.claims();
        Ok(json!({
            "authenticated": ctx.is_authenticated(),
            "sub": claims.map(|c| c.sub.clone()),
            "name": claims.map(|c| c.name.clone()),
            "email": claims.map(|c| c.email.clone()),
            "groups": ctx.groups(),
            "roles": ctx.roles(),
        }))
    }
}

/// Container exposing `./Session`; requires the host's claims store in scope
#[derive(Default)]
pub struct SessionRemote;

#[async_trait]
impl RemoteContainer for SessionRemote {
    async fn init(&self, scope: ScopeView) -> anyhow::Result<()> {
        let entry = scope
            .get(AUTHZ_LIBRARY, shellmesh_authz::VERSION)
            .ok_or_else(|| anyhow::anyhow!("{}@{} not shared", AUTHZ_LIBRARY, shellmesh_authz::VERSION))?;

        let store = entry
            .resolve_as::<ClaimsStore>()
            .await
            .ok_or_else(|| anyhow::anyhow!("{} entry is not a claims store", AUTHZ_LIBRARY))?;
        debug!(session = store.state().label(), "session remote bound to host store");
        Ok(())
    }

    async fn get(&self, export_path: &str) -> Option<ExportFactory> {
        match export_path {
            "./Session" => Some(export_factory(Arc::new(SessionPanel))),
            _ => None,
        }
    }
}

/// Catalog of every builtin remote
pub fn catalog() -> StaticArtifactFetcher {
    StaticArtifactFetcher::new().with(SESSION_LOCATION, Arc::new(SessionRemote))
}
