use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;

use proxvoice_core::protocol::ingest::{PoseBatch, PoseBatchResponse};

use crate::api::{admit, ApiError, Bucket};
use crate::app_state::AppState;
use crate::clock::now_ms;

/// `POST /policy/poses`: store a batch, then recompute the room immediately.
pub async fn ingest_poses(
    State(app): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PoseBatchResponse>, ApiError> {
    admit(&app, Bucket::Poses, connect.as_ref(), &headers)?;
    let batch = PoseBatch::from_json(&body)?;

    let captured_at = batch.timestamp_ms;
    app.rooms().upsert_poses(
        &batch.room_id,
        batch.poses.iter().map(|p| (p.participant_id.as_str(), p.to_pose(captured_at))),
        now_ms(),
    );

    // Only an empty batch can leave behind a room the sweep may drop before
    // the recompute; it reads as a fresh room at revision 0.
    let revision = app.scheduler().recompute_and_enforce(&batch.room_id).unwrap_or(0);

    tracing::debug!(room_id = %batch.room_id, poses = batch.poses.len(), revision, "pose batch applied");

    Ok(Json(PoseBatchResponse {
        ok: true,
        room_id: batch.room_id,
        revision,
    }))
}
