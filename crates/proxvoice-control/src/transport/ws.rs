//! Policy socket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS
//! - Verify the `token` query parameter (scoped socket credential)
//! - Bind the socket to its `(room, participant)` in the hub
//! - Send a snapshot on connect, answer snapshot requests
//! - Reject malformed input with `policy.error` + close

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::Instrument;

use proxvoice_core::protocol::socket::{PolicyInbound, PolicyOutbound, SocketErrorCode};

use crate::app_state::AppState;
use crate::auth::{verify_socket_token, SocketClaims};
use crate::clock::now_ms;
use crate::realtime::{close_message, Connection, SnapshotReply};
use crate::transport::codec::{decode, Inbound};

/// Per-binding outbound queue depth.
const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn policy_socket(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<SocketQuery>,
) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let secret = &app.cfg().auth.socket_secret;
        let claims = match q.token.as_deref().map(|t| verify_socket_token(t, secret, now_ms())) {
            Some(Ok(claims)) => claims,
            _ => {
                tracing::debug!("policy socket rejected: bad or missing token");
                send_failure(&app, &mut socket, SocketErrorCode::AuthFailed).await;
                return;
            }
        };

        let span = tracing::info_span!(
            "policy_socket",
            room_id = %claims.room_id,
            participant_id = %claims.participant_id,
        );
        run_session(app, claims, socket).instrument(span).await;
    })
}

/// Write `policy.error` + close directly to a sink we own.
async fn write_failure<S>(sink: &mut S, code: SocketErrorCode)
where
    S: Sink<Message> + Unpin,
{
    let _ = sink.send(Message::Text(PolicyOutbound::error(code).to_json())).await;
    let _ = sink.send(close_message(code)).await;
}

/// Reject input the session itself detected; hub-initiated closes are counted by the hub.
async fn send_failure<S>(app: &AppState, sink: &mut S, code: SocketErrorCode)
where
    S: Sink<Message> + Unpin,
{
    app.metrics().socket_errors.inc(&[("code", code.as_str())]);
    write_failure(sink, code).await;
}

async fn run_session(app: AppState, claims: SocketClaims, socket: WebSocket) {
    let hub = app.hub();
    let (conn, mut rx) = Connection::channel(OUTBOUND_QUEUE);
    let binding = hub.register(&claims.room_id, &claims.participant_id, conn);
    let id = binding.id();
    tracing::info!(binding = id, "policy socket opened");

    hub.send_snapshot(id);

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // hub asked us to close: flush what is queued, then error + close
            changed = rx.close.changed() => {
                let code = changed.ok().and_then(|()| rx.closed_with());
                let Some(code) = code else { break };
                while let Ok(m) = rx.messages.try_recv() {
                    if ws_tx.send(m).await.is_err() {
                        break;
                    }
                }
                tracing::debug!(code = code.as_str(), "policy socket closed by hub");
                write_failure(&mut ws_tx, code).await;
                break;
            }

            // outbound writer
            maybe_out = rx.messages.recv() => {
                let Some(m) = maybe_out else { break };
                if ws_tx.send(m).await.is_err() {
                    break;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break };

                match decode(&msg) {
                    Inbound::Request(PolicyInbound::SnapshotRequest { from_revision }) => {
                        tracing::debug!(?from_revision, "snapshot requested");
                        if hub.answer_snapshot_request(id) == SnapshotReply::RoomMissing {
                            tracing::debug!("snapshot requested for a missing room");
                        }
                    }
                    Inbound::Invalid(err) => {
                        tracing::debug!(code = err.code.as_str(), detail = %err.detail, "malformed policy socket input");
                        send_failure(&app, &mut ws_tx, err.code).await;
                        break;
                    }
                    Inbound::Control => {}
                    Inbound::Close => break,
                }
            }
        }
    }

    drop(binding);
    tracing::info!(binding = id, "policy socket closed");
}
