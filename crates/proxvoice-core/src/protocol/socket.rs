//! Policy socket protocol (JSON text frames).
//!
//! Inbound traffic is decoded in one explicit step into a typed
//! `PolicyInbound` or a structured `InboundError`; the three failure stages
//! (frame, JSON, schema) map to distinct error codes. Every error code knows
//! its recoverability and the close code that follows it.

use serde::{Deserialize, Serialize};

/// Close codes used on the policy socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Structurally invalid frame, JSON, or message.
    MalformedInput,
    /// Socket token missing, invalid or expired.
    Unauthorized,
    /// The bound room no longer exists.
    RoomMissing,
    /// Reconnect grace expired; the client should open a new session.
    StaleSession,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::MalformedInput => 4400,
            CloseCode::Unauthorized => 4401,
            CloseCode::RoomMissing => 4404,
            CloseCode::StaleSession => 4408,
        }
    }
}

/// `policy.error` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketErrorCode {
    AuthFailed,
    InvalidFrame,
    InvalidJson,
    InvalidMessage,
    RoomMissing,
    StaleSession,
}

impl SocketErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketErrorCode::AuthFailed => "auth_failed",
            SocketErrorCode::InvalidFrame => "invalid_frame",
            SocketErrorCode::InvalidJson => "invalid_json",
            SocketErrorCode::InvalidMessage => "invalid_message",
            SocketErrorCode::RoomMissing => "room_missing",
            SocketErrorCode::StaleSession => "stale_session",
        }
    }

    /// Whether the client may reconnect and expect success.
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            SocketErrorCode::AuthFailed | SocketErrorCode::RoomMissing | SocketErrorCode::StaleSession
        )
    }

    pub fn close_code(self) -> CloseCode {
        match self {
            SocketErrorCode::AuthFailed => CloseCode::Unauthorized,
            SocketErrorCode::InvalidFrame | SocketErrorCode::InvalidJson | SocketErrorCode::InvalidMessage => {
                CloseCode::MalformedInput
            }
            SocketErrorCode::RoomMissing => CloseCode::RoomMissing,
            SocketErrorCode::StaleSession => CloseCode::StaleSession,
        }
    }

    /// Close reason sent alongside the close code.
    pub fn close_reason(self) -> &'static str {
        match self {
            SocketErrorCode::AuthFailed => "unauthorized",
            other => other.as_str(),
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            SocketErrorCode::AuthFailed => "Invalid socket token",
            SocketErrorCode::InvalidFrame => "Inbound socket frame type is not supported",
            SocketErrorCode::InvalidJson => "Inbound socket payload is not valid JSON",
            SocketErrorCode::InvalidMessage => "Inbound socket message failed validation",
            SocketErrorCode::RoomMissing => "Room no longer exists",
            SocketErrorCode::StaleSession => "Session timed out during reconnect grace window",
        }
    }
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyOutbound {
    /// Full audibility state for one listener.
    #[serde(rename = "policy.snapshot", rename_all = "camelCase")]
    Snapshot {
        room_id: String,
        participant_id: String,
        revision: u64,
        can_hear: Vec<String>,
        timestamp_ms: u64,
    },
    /// Audibility list of one listener changed at `revision`.
    #[serde(rename = "policy.audibility.delta", rename_all = "camelCase")]
    Delta {
        room_id: String,
        participant_id: String,
        revision: u64,
        can_hear: Vec<String>,
        timestamp_ms: u64,
    },
    #[serde(rename = "policy.error")]
    Error {
        code: SocketErrorCode,
        message: String,
        recoverable: bool,
    },
}

impl PolicyOutbound {
    /// Error message with the code's default text and recoverability.
    pub fn error(code: SocketErrorCode) -> Self {
        PolicyOutbound::Error {
            code,
            message: code.default_message().to_string(),
            recoverable: code.recoverable(),
        }
    }

    /// Serialize to a text frame payload.
    pub fn to_json(&self) -> String {
        // Plain strings/integers/bools only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyInbound {
    /// Ask for a fresh snapshot. `from_revision` is a resume hint; the server
    /// currently always answers with a full snapshot.
    #[serde(rename = "policy.snapshot.request", rename_all = "camelCase")]
    SnapshotRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_revision: Option<u64>,
    },
}

/// Raw inbound frame as seen by the transport.
#[derive(Debug, Clone, Copy)]
pub enum InboundFrame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// Structured decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundError {
    pub code: SocketErrorCode,
    pub detail: String,
}

impl InboundError {
    fn new(code: SocketErrorCode, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into() }
    }
}

/// Decode one inbound frame: frame -> UTF-8 text -> JSON -> typed message.
pub fn decode_inbound(frame: InboundFrame<'_>) -> std::result::Result<PolicyInbound, InboundError> {
    let text = match frame {
        InboundFrame::Text(s) => s,
        InboundFrame::Binary(b) => std::str::from_utf8(b)
            .map_err(|e| InboundError::new(SocketErrorCode::InvalidFrame, format!("binary frame is not utf-8: {e}")))?,
    };

    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| InboundError::new(SocketErrorCode::InvalidJson, e.to_string()))?;

    PolicyInbound::deserialize(value).map_err(|e| InboundError::new(SocketErrorCode::InvalidMessage, e.to_string()))
}
