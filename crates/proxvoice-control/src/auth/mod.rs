//! Credentials: operator bearer secret and scoped policy socket tokens.

pub mod token;

use proxvoice_core::error::{ProxVoiceError, Result};

pub use token::{mint_socket_token, verify_socket_token, SocketClaims};

/// Constant-time byte comparison.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check an `Authorization` header value against the shared operator secret.
pub fn check_bearer(header: Option<&str>, expected: &str) -> Result<()> {
    let Some((scheme, token)) = header.unwrap_or_default().split_once(' ') else {
        return Err(ProxVoiceError::AuthFailed);
    };
    if scheme != "Bearer" || !ct_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(ProxVoiceError::AuthFailed);
    }
    Ok(())
}
