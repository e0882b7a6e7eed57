//! Session token decoding
//!
//! Tokens are compact `header.claims.signature` strings issued by the identity
//! provider. Only the claims segment is read here: signature verification is
//! the issuer's responsibility.

use crate::error::{AuthzError, Result};
use crate::types::Claims;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Header used for tokens minted locally (mock auth, tests)
const UNSIGNED_HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

/// Decode the claims segment of a compact token
///
/// # Errors
///
/// Returns [`AuthzError::MalformedToken`] if the token does not have three
/// segments, the claims segment is not base64url, or the JSON does not carry
/// at least `sub` and `exp`.
pub fn decode(token: &str) -> Result<Claims> {
    let token = token.trim();
    let mut segments = token.split('.');

    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthzError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    if payload.is_empty() {
        return Err(AuthzError::MalformedToken(
            "empty claims segment".to_string(),
        ));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthzError::MalformedToken(format!("claims segment: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthzError::MalformedToken(format!("claims payload: {}", e)))
}

/// Encode claims into an unsigned token (`alg: none`)
///
/// Only for locally simulated sessions; such tokens carry an empty signature.
pub fn encode_unsigned(claims: &Claims) -> Result<String> {
    let payload = serde_json::to_vec(claims)
        .map_err(|e| AuthzError::MalformedToken(format!("claims payload: {}", e)))?;

    Ok(format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(UNSIGNED_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    ))
}
