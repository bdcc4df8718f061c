//! Voice transport credential issuance.

use std::collections::BTreeMap;

use serde::Serialize;

use proxvoice_core::error::{ProxVoiceError, Result};

use crate::auth::token;
use crate::config::TransportSection;

/// What a participant is being admitted to.
#[derive(Debug, Clone, Copy)]
pub struct TransportGrant<'a> {
    pub room_id: &'a str,
    pub participant_id: &'a str,
    pub display_name: Option<&'a str>,
    pub metadata: Option<&'a BTreeMap<String, String>>,
}

/// Credentials handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCredentials {
    pub url: String,
    pub token: String,
    pub expires_at_ms: u64,
}

pub trait VoiceTransport: Send + Sync {
    fn issue(&self, grant: TransportGrant<'_>, now_ms: u64) -> Result<TransportCredentials>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant<'a> {
    room: &'a str,
    room_join: bool,
    can_publish: bool,
    can_subscribe: bool,
    can_publish_data: bool,
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    jti: &'a str,
    nbf: u64,
    exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<String>,
    video: VideoGrant<'a>,
}

/// LiveKit-compatible access tokens (HS256 signed with the API secret).
pub struct LiveKitTransport {
    url: String,
    api_key: String,
    api_secret: String,
    ttl_sec: u64,
}

impl LiveKitTransport {
    pub fn new(cfg: &TransportSection) -> Self {
        Self {
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
            ttl_sec: cfg.token_ttl_sec,
        }
    }
}

impl VoiceTransport for LiveKitTransport {
    fn issue(&self, grant: TransportGrant<'_>, now_ms: u64) -> Result<TransportCredentials> {
        let nbf = now_ms / 1000;
        let exp = nbf.saturating_add(self.ttl_sec);

        let metadata = grant
            .metadata
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ProxVoiceError::Internal(format!("metadata encode failed: {e}")))?;

        let claims = AccessClaims {
            iss: &self.api_key,
            sub: grant.participant_id,
            jti: grant.participant_id,
            nbf,
            exp,
            name: grant.display_name,
            metadata,
            video: VideoGrant {
                room: grant.room_id,
                room_join: true,
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
            },
        };

        Ok(TransportCredentials {
            url: self.url.clone(),
            token: token::sign(&claims, self.api_secret.as_bytes())?,
            expires_at_ms: now_ms.saturating_add(self.ttl_sec.saturating_mul(1000)),
        })
    }
}
