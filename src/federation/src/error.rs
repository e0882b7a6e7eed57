//! Error taxonomy for discovery, loading and rendering
//!
//! Errors are `Clone` so one failure can be delivered to every caller that
//! joined a coalesced fetch.

use thiserror::Error;

/// Discovery-layer failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// Network failure or non-success response
    #[error("Manifest fetch from {url} failed: {reason}")]
    Fetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Response did not contain a well-formed mapping of remotes
    #[error("Manifest is malformed: {0}")]
    Malformed(String),
}

/// Module loading failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// User lacks every role that would grant access
    #[error("Not authorized to load '{module}' (requires one of: {})", .required.join(", "))]
    AuthorizationDenied {
        module: String,
        required: Vec<String>,
    },

    /// Manifest could not be obtained
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Logical name unknown to the manifest or development table
    #[error("Module '{0}' is not registered")]
    ModuleNotRegistered(String),

    /// Remote entry artifact could not be fetched
    #[error("Failed to fetch '{module}' from {location}: {reason}")]
    Fetch {
        module: String,
        location: String,
        reason: String,
    },

    /// Remote failed to bind to the shared scope or to produce its export
    #[error("Remote '{module}' failed to initialize: {reason}")]
    Initialization { module: String, reason: String },

    /// Remote does not expose the requested export path
    #[error("Remote '{module}' does not expose '{export_path}'")]
    ExportNotFound { module: String, export_path: String },
}

/// Distinguishable failure categories for host fallbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthorizationDenied,
    ManifestFetch,
    ManifestMalformed,
    ModuleNotRegistered,
    Fetch,
    Initialization,
    ExportNotFound,
}

impl ErrorKind {
    /// Stable identifier for logs and fallback views
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthorizationDenied => "authorization_denied",
            ErrorKind::ManifestFetch => "manifest_fetch",
            ErrorKind::ManifestMalformed => "manifest_malformed",
            ErrorKind::ModuleNotRegistered => "module_not_registered",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Initialization => "initialization",
            ErrorKind::ExportNotFound => "export_not_found",
        }
    }
}

impl ManifestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManifestError::Fetch { .. } => ErrorKind::ManifestFetch,
            ManifestError::Malformed(_) => ErrorKind::ManifestMalformed,
        }
    }
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::AuthorizationDenied { .. } => ErrorKind::AuthorizationDenied,
            LoadError::Manifest(e) => e.kind(),
            LoadError::ModuleNotRegistered(_) => ErrorKind::ModuleNotRegistered,
            LoadError::Fetch { .. } => ErrorKind::Fetch,
            LoadError::Initialization { .. } => ErrorKind::Initialization,
            LoadError::ExportNotFound { .. } => ErrorKind::ExportNotFound,
        }
    }

    /// Whether retrying the same load can succeed without a redeploy
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ManifestFetch | ErrorKind::ManifestMalformed | ErrorKind::Fetch
        )
    }

    /// Expected, user-facing outcome rather than a fault
    pub fn is_denial(&self) -> bool {
        matches!(self, LoadError::AuthorizationDenied { .. })
    }
}

/// Failures raised while rendering a loaded unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Module '{module}' export '{export_path}' failed to render: {reason}")]
    Failed {
        module: String,
        export_path: String,
        reason: String,
    },

    #[error("Module '{module}' export '{export_path}' panicked while rendering: {message}")]
    Panicked {
        module: String,
        export_path: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_recoverability() {
        let fetch = LoadError::Fetch {
            module: "m".into(),
            location: "l".into(),
            reason: "timeout".into(),
        };
        assert_eq!(fetch.kind(), ErrorKind::Fetch);
        assert!(fetch.is_recoverable());

        let manifest: LoadError = ManifestError::Malformed("no remotes".into()).into();
        assert_eq!(manifest.kind(), ErrorKind::ManifestMalformed);
        assert!(manifest.is_recoverable());

        let missing = LoadError::ModuleNotRegistered("m".into());
        assert!(!missing.is_recoverable());

        let init = LoadError::Initialization {
            module: "m".into(),
            reason: "shared dependency mismatch".into(),
        };
        assert!(!init.is_recoverable());
    }

    #[test]
    fn test_denial_message_lists_roles() {
        let denied = LoadError::AuthorizationDenied {
            module: "tradePlans".into(),
            required: vec!["trader".into(), "admin".into()],
        };
        assert!(denied.is_denial());
        assert_eq!(
            denied.to_string(),
            "Not authorized to load 'tradePlans' (requires one of: trader, admin)"
        );
        assert_eq!(denied.kind().as_str(), "authorization_denied");
    }
}
