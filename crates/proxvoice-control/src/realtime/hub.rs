use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, watch};

use proxvoice_core::protocol::socket::{PolicyOutbound, SocketErrorCode};

use crate::clock::now_ms;
use crate::obs::ControlMetrics;
use crate::policy::ChangeSet;
use crate::room::{RoomRegistry, RoomState};

/// Identifier of one live socket binding.
pub type BindingId = u64;

/// Hub side of one socket: a lossy outbound queue plus a close signal that
/// is never dropped, even when the queue is full.
pub struct Connection {
    tx: mpsc::Sender<Message>,
    close: watch::Sender<Option<SocketErrorCode>>,
}

/// Session side of a [`Connection`].
pub struct ConnectionRx {
    pub messages: mpsc::Receiver<Message>,
    pub close: watch::Receiver<Option<SocketErrorCode>>,
}

impl Connection {
    pub fn channel(capacity: usize) -> (Connection, ConnectionRx) {
        let (tx, messages) = mpsc::channel(capacity);
        let (close, close_rx) = watch::channel(None);
        (Connection { tx, close }, ConnectionRx { messages, close: close_rx })
    }
}

impl ConnectionRx {
    /// Error code the hub closed this connection with, if any.
    pub fn closed_with(&self) -> Option<SocketErrorCode> {
        *self.close.borrow()
    }
}

struct Binding {
    room_id: String,
    participant_id: String,
    conn: Connection,
}

type ParticipantKey = (String, String);

fn participant_key(room_id: &str, participant_id: &str) -> ParticipantKey {
    (room_id.to_string(), participant_id.to_string())
}

fn snapshot_message(room_id: &str, participant_id: &str, revision: u64, can_hear: Vec<String>) -> PolicyOutbound {
    PolicyOutbound::Snapshot {
        room_id: room_id.to_string(),
        participant_id: participant_id.to_string(),
        revision,
        can_hear,
        timestamp_ms: now_ms(),
    }
}

/// Outcome of a `policy.snapshot.request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReply {
    Sent,
    /// The room is gone; the binding was closed with `room_missing`.
    RoomMissing,
}

/// Socket hub:
/// - `binding_id -> Binding`
/// - `(room_id, participant_id) -> {binding_id...}`
///
/// Duplicate connections for one participant are independent bindings and
/// each receives its own copy of fan-out. The hub never mutates room state.
///
/// Per-room messages are queued while the caller holds that room's lock, so
/// every binding sees revisions in order. Nothing here blocks or awaits.
pub struct SocketHub {
    bindings: DashMap<BindingId, Binding>,
    participant_index: DashMap<ParticipantKey, DashSet<BindingId>>,
    rooms: Arc<RoomRegistry>,
    metrics: Arc<ControlMetrics>,
    seq: AtomicU64,
}

impl SocketHub {
    pub fn new(rooms: Arc<RoomRegistry>, metrics: Arc<ControlMetrics>) -> Self {
        Self {
            bindings: DashMap::new(),
            participant_index: DashMap::new(),
            rooms,
            metrics,
            seq: AtomicU64::new(1),
        }
    }

    /// Register a binding. It lives until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, room_id: &str, participant_id: &str, conn: Connection) -> BindingGuard {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        self.participant_index
            .entry(participant_key(room_id, participant_id))
            .or_insert_with(DashSet::new)
            .insert(id);
        self.bindings.insert(
            id,
            Binding {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
                conn,
            },
        );
        self.metrics.sockets_active.inc();

        BindingGuard { hub: Arc::clone(self), id }
    }

    fn unregister(&self, id: BindingId) {
        let Some((_, b)) = self.bindings.remove(&id) else { return };
        let key = participant_key(&b.room_id, &b.participant_id);
        if let Some(set) = self.participant_index.get(&key) {
            set.remove(&id);
            if set.is_empty() {
                drop(set);
                self.participant_index.remove_if(&key, |_, s| s.is_empty());
            }
        }
        self.metrics.sockets_active.dec();
    }

    pub fn connection_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn bindings_for(&self, room_id: &str, participant_id: &str) -> usize {
        self.participant_index
            .get(&participant_key(room_id, participant_id))
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Queue a message; a full or closed queue drops it silently.
    fn deliver(&self, conn: &Connection, msg: Message) {
        if let Err(e) = conn.tx.try_send(msg) {
            tracing::debug!(error = %e, "policy socket send dropped");
        }
    }

    fn send(&self, id: BindingId, msg: &PolicyOutbound) {
        if let Some(b) = self.bindings.get(&id) {
            self.deliver(&b.conn, Message::Text(msg.to_json()));
        }
    }

    /// Close a binding with `code`. The session writes `policy.error` and the
    /// close frame itself once it has flushed what is already queued.
    pub fn fail(&self, id: BindingId, code: SocketErrorCode) {
        let Some(b) = self.bindings.get(&id) else { return };
        self.fail_conn(&b.conn, code);
    }

    fn fail_conn(&self, conn: &Connection, code: SocketErrorCode) {
        // first code wins
        let signalled = conn.close.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(code);
            true
        });
        if signalled {
            self.metrics.socket_errors.inc(&[("code", code.as_str())]);
        }
    }

    /// Current snapshot for a listener (revision 0 / empty when the room is unknown).
    pub fn snapshot(&self, room_id: &str, participant_id: &str) -> PolicyOutbound {
        let (revision, can_hear) = self.rooms.listener_view(room_id, participant_id).unwrap_or_default();
        snapshot_message(room_id, participant_id, revision, can_hear)
    }

    /// Send a fresh snapshot to one binding.
    pub fn send_snapshot(&self, id: BindingId) {
        let Some((room_id, participant_id)) = self
            .bindings
            .get(&id)
            .map(|b| (b.room_id.clone(), b.participant_id.clone()))
        else {
            return;
        };
        let queued = self.rooms.with_room(&room_id, |room| {
            let msg = snapshot_message(&room_id, &participant_id, room.revision, room.can_hear(&participant_id));
            self.send(id, &msg);
        });
        if queued.is_none() {
            self.send(id, &snapshot_message(&room_id, &participant_id, 0, Vec::new()));
        }
        self.metrics.snapshots_sent.inc(&[("reason", "direct")]);
    }

    /// Answer `policy.snapshot.request` for one binding.
    pub fn answer_snapshot_request(&self, id: BindingId) -> SnapshotReply {
        let Some(room_id) = self.bindings.get(&id).map(|b| b.room_id.clone()) else {
            return SnapshotReply::Sent;
        };
        if !self.rooms.contains(&room_id) {
            self.fail(id, SocketErrorCode::RoomMissing);
            return SnapshotReply::RoomMissing;
        }
        self.send_snapshot(id);
        SnapshotReply::Sent
    }

    /// Fan out a delta to every binding of each changed listener.
    pub fn publish_deltas(&self, room_id: &str, revision: u64, changed: &ChangeSet) {
        let ts = now_ms();
        for (participant_id, can_hear) in changed {
            let Some(ids) = self.participant_index.get(&participant_key(room_id, participant_id)) else {
                continue;
            };
            let text = PolicyOutbound::Delta {
                room_id: room_id.to_string(),
                participant_id: participant_id.clone(),
                revision,
                can_hear: can_hear.clone(),
                timestamp_ms: ts,
            }
            .to_json();

            for id in ids.iter() {
                if let Some(b) = self.bindings.get(id.key()) {
                    self.deliver(&b.conn, Message::Text(text.clone()));
                    self.metrics.deltas_sent.inc(&[]);
                }
            }
        }
    }

    /// Send every binding in a locked room a fresh snapshot.
    pub fn publish_snapshots(&self, room: &RoomState) {
        for b in self.bindings.iter().filter(|b| b.room_id == room.room_id) {
            let msg = snapshot_message(&room.room_id, &b.participant_id, room.revision, room.can_hear(&b.participant_id));
            self.deliver(&b.conn, Message::Text(msg.to_json()));
            self.metrics.snapshots_sent.inc(&[("reason", "room_refresh")]);
        }
    }

    /// Send every binding in the room a fresh snapshot.
    pub fn publish_room_snapshots(&self, room_id: &str) {
        self.rooms.with_room(room_id, |room| self.publish_snapshots(room));
    }

    /// Fail and close every binding of the given participants.
    pub fn expel(&self, room_id: &str, participant_ids: &[String], code: SocketErrorCode) {
        for participant_id in participant_ids {
            let Some(ids) = self.participant_index.get(&participant_key(room_id, participant_id)) else {
                continue;
            };
            for id in ids.iter() {
                if let Some(b) = self.bindings.get(id.key()) {
                    self.fail_conn(&b.conn, code);
                }
            }
        }
    }
}

/// Close frame that follows a `policy.error`.
pub fn close_message(code: SocketErrorCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.close_code().as_u16(),
        reason: Cow::Borrowed(code.close_reason()),
    }))
}

/// Keeps a binding registered; dropping it (socket closed) unregisters it.
pub struct BindingGuard {
    hub: Arc<SocketHub>,
    id: BindingId,
}

impl BindingGuard {
    pub fn id(&self) -> BindingId {
        self.id
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
