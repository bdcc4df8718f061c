#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use proxvoice_control::auth::token;
use proxvoice_control::config::{EnforcementMode, TransportSection};
use proxvoice_control::external::{LiveKitEnforcer, TransportEnforcer};
use proxvoice_control::room::CanHearMap;

#[derive(Clone)]
struct FakeServer {
    calls: mpsc::UnboundedSender<(String, Value)>,
    fail: bool,
}

async fn room_service(
    State(server): State<FakeServer>,
    Path(method): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let claims: Value = token::verify(bearer, b"devsecret").map_err(|_| StatusCode::UNAUTHORIZED)?;
    if claims["video"]["roomAdmin"] != true || claims["video"]["room"] != body["room"] {
        return Err(StatusCode::FORBIDDEN);
    }

    let _ = server.calls.send((method.clone(), body));
    if server.fail {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    match method.as_str() {
        "ListParticipants" => Ok(Json(json!({
            "participants": [
                { "identity": "a", "tracks": [{ "sid": "TR_a", "type": "AUDIO" }] },
                { "identity": "b", "tracks": [{ "sid": "TR_b", "type": "AUDIO" }, { "sid": "TR_bv", "type": "VIDEO" }] },
                { "identity": "c", "tracks": [{ "sid": "TR_c" }] }
            ]
        }))),
        "UpdateSubscriptions" => Ok(Json(json!({}))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn serve(fail: bool) -> (SocketAddr, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/twirp/livekit.RoomService/:method", post(room_service))
        .with_state(FakeServer { calls: tx, fail });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

fn enforcer(addr: SocketAddr) -> LiveKitEnforcer {
    LiveKitEnforcer::new(&TransportSection {
        url: format!("ws://{addr}"),
        api_key: "devkey".into(),
        api_secret: "devsecret".into(),
        token_ttl_sec: 900,
        server_api_url: format!("http://{addr}"),
        enforcement: EnforcementMode::Livekit,
    })
    .unwrap()
}

fn can_hear(entries: &[(&str, &[&str])]) -> CanHearMap {
    entries
        .iter()
        .map(|(l, s)| (l.to_string(), s.iter().map(|x| x.to_string()).collect()))
        .collect()
}

#[tokio::test]
async fn subscriptions_follow_audibility() {
    let (addr, mut calls) = serve(false).await;
    let enforcer = enforcer(addr);

    let map = can_hear(&[("a", &["b"]), ("b", &[]), ("c", &["a"]), ("late", &["a"])]);
    enforcer.enforce_room("r1", &map).await.unwrap();

    let (method, body) = calls.recv().await.unwrap();
    assert_eq!(method, "ListParticipants");
    assert_eq!(body, json!({ "room": "r1" }));

    let mut updates = Vec::new();
    while let Ok((method, body)) = calls.try_recv() {
        assert_eq!(method, "UpdateSubscriptions");
        assert_eq!(body["room"], "r1");
        updates.push((
            body["identity"].as_str().unwrap().to_string(),
            body["subscribe"].as_bool().unwrap(),
            body["trackSids"].clone(),
        ));
    }
    updates.sort_by(|x, y| (&x.0, x.1).cmp(&(&y.0, y.1)));

    assert_eq!(
        updates,
        vec![
            ("a".to_string(), false, json!(["TR_c"])),
            ("a".to_string(), true, json!(["TR_b"])),
            ("b".to_string(), false, json!(["TR_a", "TR_c"])),
            ("c".to_string(), false, json!(["TR_b"])),
            ("c".to_string(), true, json!(["TR_a"])),
        ]
    );
}

#[tokio::test]
async fn server_errors_fail_the_pass() {
    let (addr, mut calls) = serve(true).await;
    let enforcer = enforcer(addr);

    let err = enforcer
        .enforce_room("r1", &can_hear(&[("a", &["b"])]))
        .await
        .unwrap_err();
    assert_eq!(err.client_code().as_str(), "INTERNAL");
    assert!(err.to_string().contains("503"));

    assert_eq!(calls.recv().await.unwrap().0, "ListParticipants");
    assert!(calls.try_recv().is_err());
}
