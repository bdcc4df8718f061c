//! Compact HS256 JSON Web Tokens.
//!
//! Used for policy socket credentials and for voice transport access tokens.
//! Only `HS256` is produced or accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use proxvoice_core::error::{ProxVoiceError, Result};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Deserialize)]
struct Header {
    alg: String,
}

fn mac(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|e| ProxVoiceError::Internal(format!("hmac key: {e}")))
}

/// Sign arbitrary claims.
pub fn sign<C: Serialize>(claims: &C, secret: &[u8]) -> Result<String> {
    let payload = serde_json::to_vec(claims)
        .map_err(|e| ProxVoiceError::Internal(format!("claims encode failed: {e}")))?;
    let signing_input = format!("{}.{}", URL_SAFE_NO_PAD.encode(HEADER), URL_SAFE_NO_PAD.encode(payload));

    let mut m = mac(secret)?;
    m.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());

    Ok(format!("{signing_input}.{sig}"))
}

/// Verify signature and algorithm, then decode claims. Expiry is the
/// caller's concern.
pub fn verify<C: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<C> {
    let mut parts = token.split('.');
    let (Some(h), Some(p), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(ProxVoiceError::AuthFailed);
    };

    let header_raw = URL_SAFE_NO_PAD.decode(h).map_err(|_| ProxVoiceError::AuthFailed)?;
    let header: Header = serde_json::from_slice(&header_raw).map_err(|_| ProxVoiceError::AuthFailed)?;
    if header.alg != "HS256" {
        return Err(ProxVoiceError::AuthFailed);
    }

    let sig = URL_SAFE_NO_PAD.decode(s).map_err(|_| ProxVoiceError::AuthFailed)?;
    let mut m = mac(secret)?;
    m.update(h.as_bytes());
    m.update(b".");
    m.update(p.as_bytes());
    m.verify_slice(&sig).map_err(|_| ProxVoiceError::AuthFailed)?;

    let payload = URL_SAFE_NO_PAD.decode(p).map_err(|_| ProxVoiceError::AuthFailed)?;
    serde_json::from_slice(&payload).map_err(|_| ProxVoiceError::AuthFailed)
}

/// Claims of a policy socket token. `iat`/`exp` are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketClaims {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "participantId")]
    pub participant_id: String,
    pub iat: u64,
    pub exp: u64,
}

pub fn mint_socket_token(
    room_id: &str,
    participant_id: &str,
    secret: &str,
    ttl_sec: u64,
    now_ms: u64,
) -> Result<String> {
    let iat = now_ms / 1000;
    let claims = SocketClaims {
        room_id: room_id.to_string(),
        participant_id: participant_id.to_string(),
        iat,
        exp: iat.saturating_add(ttl_sec),
    };
    sign(&claims, secret.as_bytes())
}

/// Any failure (format, signature, expiry, claim types) is `AuthFailed`.
pub fn verify_socket_token(token: &str, secret: &str, now_ms: u64) -> Result<SocketClaims> {
    let claims: SocketClaims = verify(token, secret.as_bytes())?;
    if now_ms / 1000 >= claims.exp {
        return Err(ProxVoiceError::AuthFailed);
    }
    Ok(claims)
}
