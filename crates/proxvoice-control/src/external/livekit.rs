//! LiveKit server API enforcement.
//!
//! Subscriptions are driven through the RoomService Twirp endpoints:
//! `ListParticipants` to learn who publishes which audio tracks, then one
//! `UpdateSubscriptions` per listener and direction. Listeners the transport
//! does not know yet are skipped; the next pass picks them up.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use proxvoice_core::error::{ProxVoiceError, Result};

use crate::auth::token;
use crate::clock::now_ms;
use crate::config::TransportSection;
use crate::room::CanHearMap;

use super::enforcer::TransportEnforcer;

const ROOM_SERVICE: &str = "twirp/livekit.RoomService";
const ADMIN_TOKEN_TTL_SEC: u64 = 600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminGrant<'a> {
    room: &'a str,
    room_admin: bool,
}

#[derive(Serialize)]
struct AdminClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    nbf: u64,
    exp: u64,
    video: AdminGrant<'a>,
}

#[derive(Serialize)]
struct ListParticipantsRequest<'a> {
    room: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize)]
struct ParticipantInfo {
    identity: String,
    #[serde(default)]
    tracks: Vec<TrackInfo>,
}

#[derive(Debug, Deserialize)]
struct TrackInfo {
    sid: String,
    // AUDIO is the zero value and may be omitted from the JSON entirely
    #[serde(default, rename = "type")]
    kind: Option<Value>,
}

impl TrackInfo {
    fn is_audio(&self) -> bool {
        match &self.kind {
            None => true,
            Some(Value::String(s)) => s == "AUDIO",
            Some(Value::Number(n)) => n.as_u64() == Some(0),
            Some(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionUpdate {
    pub identity: String,
    pub track_sids: Vec<String>,
    pub subscribe: bool,
}

/// Subscription changes that make the transport match `can_hear_by_listener`.
///
/// `audio_tracks` maps each publishing identity to its audio track sids. A
/// listener never subscribes to its own tracks.
pub(crate) fn plan_updates(
    can_hear_by_listener: &CanHearMap,
    audio_tracks: &BTreeMap<String, Vec<String>>,
) -> Vec<SubscriptionUpdate> {
    let mut updates = Vec::new();
    for (listener, speakers) in can_hear_by_listener {
        if !audio_tracks.contains_key(listener) {
            tracing::debug!(listener = %listener, "listener not in transport room yet");
            continue;
        }
        let allowed: BTreeSet<&str> = speakers.iter().map(String::as_str).collect();

        let (mut subscribe, mut unsubscribe) = (Vec::new(), Vec::new());
        for (speaker, sids) in audio_tracks.iter().filter(|(id, _)| *id != listener) {
            let bucket = if allowed.contains(speaker.as_str()) { &mut subscribe } else { &mut unsubscribe };
            bucket.extend(sids.iter().cloned());
        }

        for (track_sids, subscribe) in [(unsubscribe, false), (subscribe, true)] {
            if !track_sids.is_empty() {
                updates.push(SubscriptionUpdate {
                    identity: listener.clone(),
                    track_sids,
                    subscribe,
                });
            }
        }
    }
    updates
}

#[derive(Serialize)]
struct UpdateSubscriptionsRequest<'a> {
    room: &'a str,
    #[serde(flatten)]
    update: &'a SubscriptionUpdate,
}

/// Enforcer backed by the LiveKit server API.
pub struct LiveKitEnforcer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl LiveKitEnforcer {
    pub fn new(cfg: &TransportSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProxVoiceError::Internal(format!("transport api client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.server_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
        })
    }

    fn admin_token(&self, room_id: &str) -> Result<String> {
        let nbf = now_ms() / 1000;
        let claims = AdminClaims {
            iss: &self.api_key,
            sub: &self.api_key,
            nbf,
            exp: nbf + ADMIN_TOKEN_TTL_SEC,
            video: AdminGrant { room: room_id, room_admin: true },
        };
        token::sign(&claims, self.api_secret.as_bytes())
    }

    async fn call<B: Serialize + ?Sized>(&self, method: &str, room_id: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/{ROOM_SERVICE}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.admin_token(room_id)?)
            .json(body)
            .send()
            .await
            .map_err(|e| ProxVoiceError::Internal(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProxVoiceError::Internal(format!("{method} returned {status}: {text}")));
        }
        Ok(response)
    }

    async fn audio_tracks(&self, room_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let listed: ListParticipantsResponse = self
            .call("ListParticipants", room_id, &ListParticipantsRequest { room: room_id })
            .await?
            .json()
            .await
            .map_err(|e| ProxVoiceError::Internal(format!("ListParticipants decode failed: {e}")))?;

        Ok(listed
            .participants
            .into_iter()
            .map(|p| {
                let sids = p.tracks.into_iter().filter(TrackInfo::is_audio).map(|t| t.sid).collect();
                (p.identity, sids)
            })
            .collect())
    }
}

#[async_trait]
impl TransportEnforcer for LiveKitEnforcer {
    async fn enforce_room(&self, room_id: &str, can_hear_by_listener: &CanHearMap) -> Result<()> {
        let audio_tracks = self.audio_tracks(room_id).await?;
        let updates = plan_updates(can_hear_by_listener, &audio_tracks);
        tracing::debug!(room_id, updates = updates.len(), "updating transport subscriptions");

        try_join_all(updates.iter().map(|update| async move {
            let body = UpdateSubscriptionsRequest { room: room_id, update };
            self.call("UpdateSubscriptions", room_id, &body).await
        }))
        .await?;
        Ok(())
    }
}
