use std::collections::{BTreeMap, BTreeSet};

use proxvoice_core::protocol::ingest::VoiceSessionRequest;
use proxvoice_core::protocol::pose::Pose;

/// Listener id -> ordered speaker ids it currently hears (closest first).
pub type CanHearMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantState {
    pub participant_id: String,
    pub display_name: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub pose: Option<Pose>,
    /// Last session refresh or pose ingestion (ms).
    pub last_seen_ms: u64,
}

impl ParticipantState {
    pub fn new(participant_id: impl Into<String>, last_seen_ms: u64) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: None,
            metadata: None,
            pose: None,
            last_seen_ms,
        }
    }
}

/// Most recent session issued to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

/// Result of a stale-participant sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Evicted participant ids.
    pub removed: Vec<String>,
    /// Surviving listeners whose audible list shrank.
    pub changed: CanHearMap,
    /// Room revision after the sweep.
    pub revision: u64,
}

impl SweepOutcome {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

/// All policy state of one room.
///
/// Invariant: every id in `participants` has an entry in
/// `can_hear_by_listener` (possibly empty).
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub room_id: String,
    pub revision: u64,
    pub participants: BTreeMap<String, ParticipantState>,
    pub can_hear_by_listener: CanHearMap,
    pub sessions: BTreeMap<String, SessionRecord>,
}

impl RoomState {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            revision: 0,
            participants: BTreeMap::new(),
            can_hear_by_listener: BTreeMap::new(),
            sessions: BTreeMap::new(),
        }
    }

    /// Current audible list of `listener_id` (empty when unknown).
    pub fn can_hear(&self, listener_id: &str) -> Vec<String> {
        self.can_hear_by_listener.get(listener_id).cloned().unwrap_or_default()
    }

    fn ensure_listener_entry(&mut self, participant_id: &str) {
        if !self.can_hear_by_listener.contains_key(participant_id) {
            self.can_hear_by_listener.insert(participant_id.to_string(), Vec::new());
        }
    }

    /// Create or refresh a participant from a session request.
    /// Display fields are replaced; a known pose is kept.
    pub fn refresh_session(&mut self, req: &VoiceSessionRequest, expires_at_ms: u64, now_ms: u64) {
        self.sessions.insert(
            req.participant_id.clone(),
            SessionRecord { created_at_ms: now_ms, expires_at_ms },
        );

        let pose = self.participants.get(&req.participant_id).and_then(|p| p.pose);
        self.participants.insert(
            req.participant_id.clone(),
            ParticipantState {
                participant_id: req.participant_id.clone(),
                display_name: req.display_name.clone(),
                metadata: req.metadata.clone(),
                pose,
                last_seen_ms: now_ms,
            },
        );
        self.ensure_listener_entry(&req.participant_id);
    }

    /// Store the latest pose; creates the participant if no session exists yet.
    pub fn upsert_pose(&mut self, participant_id: &str, pose: Pose, now_ms: u64) {
        let participant = self
            .participants
            .entry(participant_id.to_string())
            .or_insert_with(|| ParticipantState::new(participant_id, now_ms));
        participant.pose = Some(pose);
        participant.last_seen_ms = now_ms;
        self.ensure_listener_entry(participant_id);
    }

    /// Evict participants not seen since `cutoff_ms` and strip them from
    /// every remaining audible list. Revision is bumped once on any removal.
    pub fn evict_stale(&mut self, cutoff_ms: u64) -> SweepOutcome {
        let removed: BTreeSet<String> = self
            .participants
            .values()
            .filter(|p| p.last_seen_ms < cutoff_ms)
            .map(|p| p.participant_id.clone())
            .collect();

        if removed.is_empty() {
            return SweepOutcome { revision: self.revision, ..SweepOutcome::default() };
        }

        for id in &removed {
            self.participants.remove(id);
            self.can_hear_by_listener.remove(id);
            self.sessions.remove(id);
        }

        let mut changed = CanHearMap::new();
        for (listener, can_hear) in self.can_hear_by_listener.iter_mut() {
            let before = can_hear.len();
            can_hear.retain(|speaker| !removed.contains(speaker));
            if can_hear.len() != before {
                changed.insert(listener.clone(), can_hear.clone());
            }
        }

        self.revision += 1;

        SweepOutcome {
            removed: removed.into_iter().collect(),
            changed,
            revision: self.revision,
        }
    }
}
