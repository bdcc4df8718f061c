//! Ingestion bodies (session creation + pose batches).
//!
//! Bodies are decoded from raw bytes and validated in a single step
//! (`from_json`); nothing partially typed leaves this module. Unknown fields
//! are ignored so older clients keep working when the schema grows.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProxVoiceError, Result};
use crate::protocol::pose::{Orientation, Pose, Vec3};

/// Upper bound on entries in one pose batch.
pub const MAX_POSES_PER_BATCH: usize = 500;

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ProxVoiceError::BadRequest(format!("invalid json body: {e}")))
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProxVoiceError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

/// `POST /sessions` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSessionRequest {
    pub participant_id: String,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl VoiceSessionRequest {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let req: Self = decode(bytes)?;
        req.validate()?;
        Ok(req)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("participantId", &self.participant_id)?;
        require_non_empty("roomId", &self.room_id)?;
        if let Some(name) = &self.display_name {
            require_non_empty("displayName", name)?;
        }
        Ok(())
    }
}

/// `POST /sessions` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSessionResponse {
    pub room_id: String,
    pub participant_id: String,
    pub livekit_url: String,
    pub token: String,
    pub token_expires_at_ms: u64,
    pub policy_socket_url: String,
    pub policy_socket_token: String,
    pub policy_revision: u64,
}

/// One entry of a pose batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseUpdate {
    pub participant_id: String,
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl PoseUpdate {
    /// Stamp this update with the batch capture time.
    pub fn to_pose(&self, timestamp_ms: u64) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
            timestamp_ms,
        }
    }
}

/// `POST /policy/poses` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseBatch {
    pub room_id: String,
    pub timestamp_ms: u64,
    pub poses: Vec<PoseUpdate>,
}

impl PoseBatch {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let batch: Self = decode(bytes)?;
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("roomId", &self.room_id)?;
        if self.poses.len() > MAX_POSES_PER_BATCH {
            return Err(ProxVoiceError::BadRequest(format!(
                "poses must contain at most {MAX_POSES_PER_BATCH} entries (got {})",
                self.poses.len()
            )));
        }
        for (i, p) in self.poses.iter().enumerate() {
            if p.participant_id.is_empty() {
                return Err(ProxVoiceError::BadRequest(format!("poses[{i}].participantId must not be empty")));
            }
            let orientation_ok = p
                .orientation
                .map(|o| o.forward.is_finite() && o.up.is_finite())
                .unwrap_or(true);
            if !p.position.is_finite() || !orientation_ok {
                return Err(ProxVoiceError::BadRequest(format!("poses[{i}] has non-finite coordinates")));
            }
        }
        Ok(())
    }
}

/// `POST /policy/poses` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseBatchResponse {
    pub ok: bool,
    pub room_id: String,
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ClientCode;

    #[test]
    fn session_request_accepts_optional_fields() {
        let req = VoiceSessionRequest::from_json(
            br#"{"participantId":"a","roomId":"r","displayName":"Ann","metadata":{"team":"red"},"extra":1}"#,
        )
        .unwrap();
        assert_eq!(req.display_name.as_deref(), Some("Ann"));
        assert_eq!(req.metadata.unwrap().get("team").map(String::as_str), Some("red"));
    }

    #[test]
    fn session_request_rejects_empty_ids() {
        let err = VoiceSessionRequest::from_json(br#"{"participantId":"","roomId":"r"}"#).unwrap_err();
        assert_eq!(err.client_code(), ClientCode::BadRequest);

        let err = VoiceSessionRequest::from_json(br#"{"participantId":"a","roomId":"r","displayName":""}"#)
            .unwrap_err();
        assert_eq!(err.client_code(), ClientCode::BadRequest);
    }

    #[test]
    fn pose_batch_rejects_oversized_batch() {
        let poses: Vec<PoseUpdate> = (0..=MAX_POSES_PER_BATCH)
            .map(|i| PoseUpdate {
                participant_id: format!("p{i}"),
                position: Vec3::default(),
                orientation: None,
            })
            .collect();
        let body = serde_json::to_vec(&PoseBatch { room_id: "r".into(), timestamp_ms: 1, poses }).unwrap();
        let err = PoseBatch::from_json(&body).unwrap_err();
        assert_eq!(err.client_code(), ClientCode::BadRequest);
    }

    #[test]
    fn pose_batch_rejects_negative_or_fractional_timestamp() {
        assert!(PoseBatch::from_json(br#"{"roomId":"r","timestampMs":-1,"poses":[]}"#).is_err());
        assert!(PoseBatch::from_json(br#"{"roomId":"r","timestampMs":1.5,"poses":[]}"#).is_err());
    }

    #[test]
    fn pose_update_carries_batch_timestamp() {
        let batch = PoseBatch::from_json(
            br#"{"roomId":"r","timestampMs":42,"poses":[{"participantId":"a","position":{"x":1,"y":2,"z":3}}]}"#,
        )
        .unwrap();
        let pose = batch.poses[0].to_pose(batch.timestamp_ms);
        assert_eq!(pose.timestamp_ms, 42);
        assert_eq!(pose.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(pose.orientation.is_none());
    }
}
