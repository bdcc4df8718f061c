//! Operational HTTP endpoints.
//!
//! - `/health`  : liveness + server clock
//! - `/ready`   : effective policy constants
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app_state::AppState;
use crate::clock::now_ms;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "ts": now_ms() }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let policy = &state.cfg().policy;
    Json(json!({
        "ok": true,
        "recomputeHz": policy.recompute_hz,
        "radiusEnterM": policy.radius_enter_m,
        "radiusExitM": policy.radius_exit_m,
        "maxSubscribedVoices": policy.max_subscribed_voices,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let m = state.metrics();
    m.rooms.set(state.rooms().len() as i64);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        m.render(),
    )
        .into_response()
}
