//! Ingestion endpoints (`POST /sessions`, `POST /policy/poses`).
//!
//! Every request is checked in the same order: per-caller rate limit,
//! operator bearer token, body validation.

pub mod error;
pub mod poses;
pub mod sessions;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap};

use proxvoice_core::error::ProxVoiceError;

use crate::app_state::AppState;
use crate::auth::check_bearer;
use crate::clock::now_ms;

pub use error::ApiError;

const RATE_WINDOW_MS: u64 = 60_000;

/// Rate limit bucket of an ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Sessions,
    Poses,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Sessions => "sessions",
            Bucket::Poses => "poses",
        }
    }

    fn per_minute(self, app: &AppState) -> u32 {
        let limits = &app.cfg().rate_limits;
        match self {
            Bucket::Sessions => limits.sessions_per_minute,
            Bucket::Poses => limits.pose_batches_per_minute,
        }
    }
}

/// Peer IP, or `"unknown"` when the server was not built with connect info.
pub fn caller_identity(connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limit, then bearer auth.
fn admit(
    app: &AppState,
    bucket: Bucket,
    connect: Option<&ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let caller = caller_identity(connect);
    let key = format!("{}:{caller}", bucket.as_str());
    if !app.limiter().allow(&key, bucket.per_minute(app), RATE_WINDOW_MS, now_ms()) {
        app.metrics().rate_limited.inc(&[("bucket", bucket.as_str())]);
        tracing::debug!(bucket = bucket.as_str(), caller = %caller, "rate limited");
        return Err(ProxVoiceError::RateLimited.into());
    }

    let authz = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    check_bearer(authz, &app.cfg().auth.control_token)?;
    Ok(())
}
