//! Error types for session handling and role mapping

use thiserror::Error;

/// Authorization layer errors
///
/// None of these escape the claims store: a token that fails to decode
/// degrades the session to `Unauthenticated` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// Token is not a three-part compact token or its claims segment is unreadable
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token decoded but has already expired
    #[error("Token expired at {0}")]
    TokenExpired(i64),

    /// Invalid group to role mapping entry
    #[error("Invalid role mapping: {0}")]
    InvalidMapping(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
