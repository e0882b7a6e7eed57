//! Host-level mount failures

use shellmesh_federation::{ErrorKind, LoadError};
use thiserror::Error;

/// Why a mount attempt did not produce a unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Load did not finish within the host timeout
    #[error("Loading '{module}' timed out after {after_ms}ms")]
    Timeout { module: String, after_ms: u64 },

    #[error("No mount point named '{0}'")]
    UnknownSlot(String),
}

impl ShellError {
    /// Underlying loader category, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ShellError::Load(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Whether another attempt can succeed without a redeploy
    pub fn is_recoverable(&self) -> bool {
        match self {
            ShellError::Load(e) => e.is_recoverable(),
            ShellError::Timeout { .. } => true,
            ShellError::UnknownSlot(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
