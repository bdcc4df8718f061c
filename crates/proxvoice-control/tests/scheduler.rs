#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use serde_json::{json, Value};

use proxvoice_control::app_state::AppState;
use proxvoice_control::external::{LiveKitTransport, TransportEnforcer};
use proxvoice_control::realtime::{Connection, ConnectionRx, SnapshotReply};
use proxvoice_control::room::CanHearMap;
use proxvoice_core::error::{ProxVoiceError, Result};
use proxvoice_core::protocol::ingest::VoiceSessionRequest;
use proxvoice_core::protocol::pose::{Pose, Vec3};
use proxvoice_core::protocol::socket::SocketErrorCode;

const T0: u64 = 1_000_000;

fn conn() -> (Connection, ConnectionRx) {
    Connection::channel(16)
}

fn next_json(rx: &mut ConnectionRx) -> Value {
    match rx.messages.try_recv().unwrap() {
        Message::Text(s) => serde_json::from_str(&s).unwrap(),
        other => panic!("expected text, got {other:?}"),
    }
}

async fn settle(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.scheduler().enforcement().in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

fn join(state: &AppState, room: &str, id: &str, x: f64, now_ms: u64) {
    let req = VoiceSessionRequest {
        participant_id: id.into(),
        room_id: room.into(),
        display_name: None,
        metadata: None,
    };
    state.rooms().create_or_refresh_session(&req, now_ms + 900_000, now_ms);
    state.rooms().upsert_pose(room, id, Pose::at(Vec3::new(x, 0.0, 0.0), now_ms), now_ms);
}

#[tokio::test]
async fn stale_participant_is_evicted_and_its_socket_closed() {
    let (state, _rx) = common::state("");
    let hub = state.hub();
    let scheduler = state.scheduler();

    let (ca, mut rxa) = conn();
    let (cb, mut rxb) = conn();
    let _ga = hub.register("r1", "a", ca);
    let _gb = hub.register("r1", "b", cb);

    join(&state, "r1", "a", 0.0, T0);
    join(&state, "r1", "b", 10.0, T0);
    assert_eq!(scheduler.recompute_and_enforce("r1"), Some(1));
    assert_eq!(next_json(&mut rxa)["canHear"], json!(["b"]));
    assert_eq!(next_json(&mut rxb)["canHear"], json!(["a"]));

    // a keeps reporting, b goes silent past the 20 s grace
    state.rooms().upsert_pose("r1", "a", Pose::at(Vec3::default(), T0 + 15_000), T0 + 15_000);
    scheduler.tick(T0 + 25_000);

    let delta = next_json(&mut rxa);
    assert_eq!(delta["type"], "policy.audibility.delta");
    assert_eq!(delta["revision"], 2);
    assert_eq!(delta["canHear"], json!([]));
    assert!(rxa.messages.try_recv().is_err());
    assert_eq!(rxa.closed_with(), None);

    // b's binding is told to close; the session writes error + 4408
    assert_eq!(rxb.closed_with(), Some(SocketErrorCode::StaleSession));

    let (participants, lists) = state
        .rooms()
        .with_room("r1", |room| {
            (
                room.participants.keys().cloned().collect::<Vec<_>>(),
                room.can_hear_by_listener.clone(),
            )
        })
        .unwrap();
    assert_eq!(participants, vec!["a".to_string()]);
    assert!(!lists.contains_key("b"));
    assert_eq!(state.metrics().stale_evictions.get(&[]), 1);
}

#[tokio::test]
async fn eviction_without_list_changes_refreshes_snapshots() {
    let (state, _rx) = common::state("");
    let hub = state.hub();
    let scheduler = state.scheduler();

    join(&state, "r1", "a", 0.0, T0 + 10_000);
    join(&state, "r1", "far", 100.0, T0);
    assert_eq!(scheduler.recompute_and_enforce("r1"), Some(0));

    let (ca, mut rxa) = conn();
    let _ga = hub.register("r1", "a", ca);

    scheduler.tick(T0 + 25_000);

    let snap = next_json(&mut rxa);
    assert_eq!(snap["type"], "policy.snapshot");
    assert_eq!(snap["revision"], 1);
    assert_eq!(snap["canHear"], json!([]));
}

#[tokio::test]
async fn empty_rooms_are_kept_by_default() {
    let (state, _rx) = common::state("");
    join(&state, "r1", "a", 0.0, T0);

    state.scheduler().tick(T0 + 60_000);

    assert!(state.rooms().contains("r1"));
    assert_eq!(state.rooms().with_room("r1", |r| r.revision), Some(1));
}

#[tokio::test]
async fn empty_rooms_can_be_evicted() {
    let (state, _rx) = common::state("policy:\n  evict_empty_rooms: true\n");
    let hub = state.hub();

    join(&state, "r1", "a", 0.0, T0);
    let (ca, mut rxa) = conn();
    let guard = hub.register("r1", "a", ca);

    state.scheduler().tick(T0 + 60_000);
    assert!(!state.rooms().contains("r1"));

    // snapshot refresh, then the stale_session close
    assert_eq!(next_json(&mut rxa)["type"], "policy.snapshot");
    assert_eq!(rxa.closed_with(), Some(SocketErrorCode::StaleSession));

    // a lingering socket asking again learns the room is gone
    assert_eq!(hub.answer_snapshot_request(guard.id()), SnapshotReply::RoomMissing);
    assert!(rxa.messages.try_recv().is_err());
    assert_eq!(state.metrics().socket_errors.get(&[("code", "room_missing")]), 1);
}

#[tokio::test]
async fn spawned_scheduler_stops_on_shutdown() {
    let (state, mut enforced) = common::state("policy:\n  recompute_hz: 10\n");

    let now = proxvoice_control::clock::now_ms();
    join(&state, "r1", "a", 0.0, now);
    join(&state, "r1", "b", 5.0, now);

    let handle = state.scheduler().spawn();
    let (room, map) = tokio::time::timeout(Duration::from_secs(2), enforced.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room, "r1");
    assert_eq!(map["a"], vec!["b".to_string()]);

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown()).await.unwrap();
    assert_eq!(state.rooms().listener_view("r1", "b").unwrap().1, vec!["a".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recomputes_keep_revisions_ordered() {
    const WORKERS: usize = 4;
    const ROUNDS: usize = 2_000;

    let (state, mut enforced) = common::state("");
    join(&state, "r1", "a", 0.0, T0);
    join(&state, "r1", "b", 10.0, T0);

    let (ca, mut rxa) = Connection::channel(WORKERS * ROUNDS + 16);
    let _ga = state.hub().register("r1", "a", ca);

    let workers: Vec<_> = (0..WORKERS)
        .map(|w| {
            let state = state.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..ROUNDS {
                    let x = if (w + i) % 2 == 0 { 10.0 } else { 40.0 };
                    state.rooms().upsert_pose("r1", "b", Pose::at(Vec3::new(x, 0.0, 0.0), T0), T0);
                    state.scheduler().recompute_and_enforce("r1");
                }
            })
        })
        .collect();
    for w in workers {
        w.await.unwrap();
    }

    let mut last = 0;
    let mut deltas = 0;
    while let Ok(Message::Text(text)) = rxa.messages.try_recv() {
        let v: Value = serde_json::from_str(&text).unwrap();
        let revision = v["revision"].as_u64().unwrap();
        assert!(revision > last, "delta revision {revision} after {last}");
        last = revision;
        deltas += 1;
    }
    assert!(deltas > 0);

    // the transport ends on the room's final state
    settle(&state).await;
    let mut applied = None;
    while let Ok((_, map)) = enforced.try_recv() {
        applied = Some(map);
    }
    let current = state.rooms().with_room("r1", |r| r.can_hear_by_listener.clone()).unwrap();
    assert_eq!(applied, Some(current));
}

/// Transport that rejects every call and counts them.
struct DownEnforcer {
    calls: AtomicUsize,
}

#[async_trait]
impl TransportEnforcer for DownEnforcer {
    async fn enforce_room(&self, _room_id: &str, _map: &CanHearMap) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProxVoiceError::Internal("transport unavailable".into()))
    }
}

#[tokio::test]
async fn failed_enforcement_is_retried_every_tick() {
    let cfg = common::config("");
    let enforcer = Arc::new(DownEnforcer { calls: AtomicUsize::new(0) });
    let voice = Arc::new(LiveKitTransport::new(&cfg.transport));
    let state = AppState::with_collaborators(cfg, voice, enforcer.clone()).unwrap();

    join(&state, "r1", "a", 0.0, T0);
    join(&state, "r1", "b", 5.0, T0);

    for i in 0..5 {
        state.scheduler().tick(T0 + i * 250);
        settle(&state).await;
    }
    assert_eq!(enforcer.calls.load(Ordering::SeqCst), 5);
    assert_eq!(state.metrics().enforcements.get(&[("outcome", "error")]), 5);
    assert!(state.scheduler().enforcement().needs_retry("r1"));
}
