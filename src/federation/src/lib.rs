//! # Shellmesh Federation
//!
//! Runtime composition of independently deployed remote modules.
//!
//! ## Pipeline
//!
//! ```text
//! authorize → resolve location → fetch artifact → init(shared scope) → get(export) → factory()
//!     │              │                 │                  │
//!  [roles]   [manifest / dev table] [deduped by URL] [SharedScope, bootstrapped first]
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use shellmesh_federation::{
//!     HostLibrary, LoaderMode, ManifestResolver, ModuleLoader, SharedScope,
//!     container::StaticArtifactFetcher, manifest::HttpManifestTransport,
//! };
//! use shellmesh_authz::RoleSet;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // The shared scope must be populated before the first load
//! let scope = Arc::new(SharedScope::new("shell"));
//! scope.bootstrap(&[HostLibrary::new("runtime", "1.0.0", Arc::new(()))]);
//!
//! let transport = Arc::new(HttpManifestTransport::new(Duration::from_secs(10))?);
//! let resolver = Arc::new(ManifestResolver::new("https://cdn.example.com/manifest.json", transport));
//! let loader = ModuleLoader::new(
//!     LoaderMode::Manifest,
//!     resolver,
//!     Arc::new(StaticArtifactFetcher::new()),
//!     scope,
//! );
//!
//! let roles: RoleSet = ["trader".to_string()].into_iter().collect();
//! let unit = loader.load_module("tradePlans", "./App", &["trader"], &roles).await?;
//! println!("loaded {}", unit.module());
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod mocks;
pub mod scope;

// Re-export commonly used types
pub use container::{ArtifactFetcher, ExportFactory, RemoteComponent, RemoteContainer};
pub use error::{ErrorKind, LoadError, ManifestError, RenderError};
pub use loader::{LoaderMode, ModuleLoader, RenderableUnit};
pub use manifest::{Manifest, ManifestResolver, ManifestTransport, ModuleDescriptor};
pub use scope::{HostLibrary, ScopeView, SharedEntry, SharedScope};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
