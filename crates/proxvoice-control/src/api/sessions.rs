use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::Json;

use proxvoice_core::protocol::ingest::{VoiceSessionRequest, VoiceSessionResponse};

use crate::api::{admit, ApiError, Bucket};
use crate::app_state::AppState;
use crate::auth::mint_socket_token;
use crate::clock::now_ms;
use crate::external::TransportGrant;

const SOCKET_PATH: &str = "/policy-socket";
const FALLBACK_HOST: &str = "127.0.0.1:8080";

/// `POST /sessions`: admit a participant to a room.
pub async fn create_session(
    State(app): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VoiceSessionResponse>, ApiError> {
    admit(&app, Bucket::Sessions, connect.as_ref(), &headers)?;
    let req = VoiceSessionRequest::from_json(&body)?;
    let now = now_ms();

    let creds = app.voice().issue(
        TransportGrant {
            room_id: &req.room_id,
            participant_id: &req.participant_id,
            display_name: req.display_name.as_deref(),
            metadata: req.metadata.as_ref(),
        },
        now,
    )?;

    let revision = app.rooms().create_or_refresh_session(&req, creds.expires_at_ms, now);

    let auth = &app.cfg().auth;
    let socket_token = mint_socket_token(
        &req.room_id,
        &req.participant_id,
        &auth.socket_secret,
        auth.socket_token_ttl_sec,
        now,
    )?;

    tracing::info!(
        room_id = %req.room_id,
        participant_id = %req.participant_id,
        revision,
        "voice session issued"
    );

    Ok(Json(VoiceSessionResponse {
        room_id: req.room_id,
        participant_id: req.participant_id,
        livekit_url: creds.url,
        token: creds.token,
        token_expires_at_ms: creds.expires_at_ms,
        policy_socket_url: policy_socket_url(app.cfg().server.public_socket_url.as_deref(), &headers),
        policy_socket_token: socket_token,
        policy_revision: revision,
    }))
}

/// Configured override, else derived from forwarding headers.
pub fn policy_socket_url(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = configured {
        return url.to_string();
    }

    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = match value("x-forwarded-proto") {
        Some("https") => "wss",
        _ => "ws",
    };
    let host = value("x-forwarded-host")
        .or_else(|| headers.get(header::HOST).and_then(|v| v.to_str().ok()))
        .unwrap_or(FALLBACK_HOST);

    format!("{proto}://{host}{SOCKET_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn socket_url_prefers_config_then_forwarded_headers() {
        let mut h = HeaderMap::new();
        h.insert(header::HOST, HeaderValue::from_static("internal:8080"));
        assert_eq!(policy_socket_url(None, &h), "ws://internal:8080/policy-socket");

        h.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        h.insert("x-forwarded-host", HeaderValue::from_static("voice.example.com"));
        assert_eq!(policy_socket_url(None, &h), "wss://voice.example.com/policy-socket");

        assert_eq!(
            policy_socket_url(Some("wss://edge.example/policy-socket"), &h),
            "wss://edge.example/policy-socket"
        );
        assert_eq!(policy_socket_url(None, &HeaderMap::new()), "ws://127.0.0.1:8080/policy-socket");
    }
}
