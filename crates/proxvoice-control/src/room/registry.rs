use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use proxvoice_core::protocol::ingest::VoiceSessionRequest;
use proxvoice_core::protocol::pose::Pose;

use super::state::RoomState;

/// Shared handle to one room. Every mutation runs under this mutex and never
/// crosses an await point.
pub type RoomHandle = Arc<Mutex<RoomState>>;

/// Lock a room. A poisoned mutex still holds consistent state (no mutation
/// spans a panic point), so recover it instead of taking the process down.
pub(crate) fn lock(handle: &Mutex<RoomState>) -> MutexGuard<'_, RoomState> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry: `room_id -> RoomState`.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    /// Rooms are created lazily on first reference.
    pub fn get_or_create(&self, room_id: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.get(room_id) {
            return Arc::clone(handle.value());
        }
        let handle = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RoomState::new(room_id))));
        Arc::clone(handle.value())
    }

    /// Read-only lookup; `None` means "not found", never an error.
    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|h| Arc::clone(h.value()))
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Run `f` against an existing room under its lock.
    pub fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomState) -> R) -> Option<R> {
        let handle = self.get(room_id)?;
        let mut room = lock(&handle);
        Some(f(&mut room))
    }

    /// Run `f` against a room, creating it first when needed.
    ///
    /// The map entry stays locked for the duration of `f`, so `remove_if_empty`
    /// can never detach the room while a writer is filling it.
    pub fn with_room_or_create<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomState) -> R) -> R {
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RoomState::new(room_id))));
        let mut room = lock(entry.value());
        f(&mut room)
    }

    /// Create or refresh a session. Returns the room's current revision.
    pub fn create_or_refresh_session(&self, req: &VoiceSessionRequest, expires_at_ms: u64, now_ms: u64) -> u64 {
        self.with_room_or_create(&req.room_id, |room| {
            room.refresh_session(req, expires_at_ms, now_ms);
            room.revision
        })
    }

    pub fn upsert_pose(&self, room_id: &str, participant_id: &str, pose: Pose, now_ms: u64) {
        self.with_room_or_create(room_id, |room| room.upsert_pose(participant_id, pose, now_ms));
    }

    /// Apply a whole batch as one atomic step.
    pub fn upsert_poses<'a>(
        &self,
        room_id: &str,
        poses: impl IntoIterator<Item = (&'a str, Pose)>,
        now_ms: u64,
    ) {
        self.with_room_or_create(room_id, |room| {
            for (participant_id, pose) in poses {
                room.upsert_pose(participant_id, pose, now_ms);
            }
        });
    }

    /// `(revision, can_hear)` for one listener, `None` if the room is unknown.
    pub fn listener_view(&self, room_id: &str, participant_id: &str) -> Option<(u64, Vec<String>)> {
        self.with_room(room_id, |room| (room.revision, room.can_hear(participant_id)))
    }

    /// Drop the room if it has no participants left. Returns whether it was removed.
    pub fn remove_if_empty(&self, room_id: &str) -> bool {
        self.rooms
            .remove_if(room_id, |_, handle| lock(handle).participants.is_empty())
            .is_some()
    }
}
