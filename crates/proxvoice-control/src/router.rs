//! Axum router wiring (ingestion HTTP, ops endpoints, policy socket upgrade).

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tracing::Instrument;

use crate::{api, app_state::AppState, ops, transport};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_BODY_BYTES: usize = 1_000_000;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(ops::health))
        .route("/ready", get(ops::ready))
        .route("/metrics", get(ops::metrics))
        .route("/sessions", post(api::sessions::create_session))
        .route("/policy/poses", post(api::poses::ingest_poses))
        .route("/policy-socket", get(transport::ws::policy_socket))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Echo the caller's `x-request-id` or assign one; run the request in a span.
async fn request_id(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed)));

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut res = next.run(req).instrument(span).await;

    if let Ok(v) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    res
}
