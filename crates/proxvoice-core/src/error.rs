//! Error type shared by the wire contracts and the control plane.
//!
//! HTTP handlers map `ProxVoiceError` variants to status codes and JSON
//! bodies themselves; policy sockets use `SocketErrorCode` instead.

use thiserror::Error;

/// Coarse failure class of a `ProxVoiceError`.
///
/// Appears as the `code` field of startup failure logs and lets tests assert
/// on the kind of failure without matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Rejected ingestion body, config value or token request.
    BadRequest,
    /// Missing or wrong operator bearer or socket token.
    AuthFailed,
    /// Per-caller ingestion budget spent for the current window.
    RateLimited,
    /// Config file `version` other than 1.
    UnsupportedVersion,
    /// Server-side failure such as signing or a transport API call.
    Internal,
}

impl ClientCode {
    /// Upper-snake name as it appears in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ProxVoiceError>;

/// Every fallible operation in proxvoice returns this.
#[derive(Debug, Error)]
pub enum ProxVoiceError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("auth failed")]
    AuthFailed,
    #[error("rate limited")]
    RateLimited,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl ProxVoiceError {
    /// Failure class, used for logging and assertions.
    pub fn client_code(&self) -> ClientCode {
        match self {
            ProxVoiceError::BadRequest(_) => ClientCode::BadRequest,
            ProxVoiceError::AuthFailed => ClientCode::AuthFailed,
            ProxVoiceError::RateLimited => ClientCode::RateLimited,
            ProxVoiceError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            ProxVoiceError::Internal(_) => ClientCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_log_code() {
        let cases = [
            (ProxVoiceError::BadRequest("roomId".into()), "BAD_REQUEST"),
            (ProxVoiceError::AuthFailed, "AUTH_FAILED"),
            (ProxVoiceError::RateLimited, "RATE_LIMITED"),
            (ProxVoiceError::UnsupportedVersion, "UNSUPPORTED_VERSION"),
            (ProxVoiceError::Internal("transport down".into()), "INTERNAL"),
        ];
        for (err, code) in cases {
            assert_eq!(err.client_code().as_str(), code);
        }
        assert_eq!(ProxVoiceError::BadRequest("roomId".into()).to_string(), "bad request: roomId");
    }
}
