//! Shellmesh Host
//!
//! Embeds the authorization and federation crates into a runnable shell:
//! configuration, bootstrap ordering, isolated mount points with retry, and
//! re-gating of mounted modules when the session's roles change.

pub mod builtin;
pub mod config;
pub mod error;
pub mod retry;
pub mod shell;

pub use config::{HostConfig, Mode};
pub use error::ShellError;
pub use retry::RetryPolicy;
pub use shell::{MountState, Shell};
