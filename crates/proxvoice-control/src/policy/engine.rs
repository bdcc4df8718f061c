//! Audibility engine.
//!
//! Pure computation over one `RoomState`: the only side effects are the
//! in-place update of `can_hear_by_listener` and the revision bump.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::room::{CanHearMap, ParticipantState, RoomState};

/// Listener id -> new audible list, for listeners that changed in a pass.
pub type ChangeSet = CanHearMap;

/// Tunables of the audibility decision.
///
/// `radius_exit_m >= radius_enter_m` is a deployment contract (checked by
/// config validation); the engine does not enforce it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConstants {
    pub max_subscribed_voices: usize,
    pub radius_enter_m: f64,
    pub radius_exit_m: f64,
}

/// Distance from listener to speaker when the speaker is eligible.
fn eligible_distance(
    listener: &ParticipantState,
    speaker: &ParticipantState,
    previously_audible: &HashSet<&str>,
    constants: &PolicyConstants,
) -> Option<f64> {
    let (Some(lp), Some(sp)) = (listener.pose.as_ref(), speaker.pose.as_ref()) else {
        return None;
    };
    let d = lp.position.distance(&sp.position);
    let radius = if previously_audible.contains(speaker.participant_id.as_str()) {
        constants.radius_exit_m
    } else {
        constants.radius_enter_m
    };
    (d <= radius).then_some(d)
}

fn audible_list(room: &RoomState, listener: &ParticipantState, constants: &PolicyConstants) -> Vec<String> {
    let previous: HashSet<&str> = room
        .can_hear_by_listener
        .get(&listener.participant_id)
        .map(|ids| ids.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let mut candidates: Vec<(&str, f64)> = room
        .participants
        .values()
        .filter(|s| s.participant_id != listener.participant_id)
        .filter_map(|s| {
            eligible_distance(listener, s, &previous, constants).map(|d| (s.participant_id.as_str(), d))
        })
        .collect();

    // Closest first; equal distances fall back to id order so truncation is reproducible.
    candidates.sort_by(|a, b| match a.1.total_cmp(&b.1) {
        Ordering::Equal => a.0.cmp(b.0),
        other => other,
    });

    candidates
        .into_iter()
        .take(constants.max_subscribed_voices)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Recompute every listener's audible list.
///
/// Returns only listeners whose list changed (content or order). The room
/// revision is bumped once when the result is non-empty; an empty result is
/// a no-op.
pub fn recompute(room: &mut RoomState, constants: &PolicyConstants) -> ChangeSet {
    let mut changed = ChangeSet::new();

    for listener in room.participants.values() {
        let next = audible_list(room, listener, constants);
        let prev = room.can_hear_by_listener.get(&listener.participant_id);
        if prev.map(Vec::as_slice).unwrap_or_default() != next.as_slice() {
            changed.insert(listener.participant_id.clone(), next);
        }
    }

    if changed.is_empty() {
        return changed;
    }

    for (listener, next) in &changed {
        room.can_hear_by_listener.insert(listener.clone(), next.clone());
    }
    room.revision += 1;

    let missing: Vec<String> = room
        .participants
        .keys()
        .filter(|id| !room.can_hear_by_listener.contains_key(*id))
        .cloned()
        .collect();
    for id in missing {
        room.can_hear_by_listener.insert(id, Vec::new());
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxvoice_core::protocol::pose::{Pose, Vec3};

    const DEFAULTS: PolicyConstants = PolicyConstants {
        max_subscribed_voices: 12,
        radius_enter_m: 24.0,
        radius_exit_m: 26.0,
    };

    fn place(room: &mut RoomState, id: &str, x: f64) {
        let p = room
            .participants
            .entry(id.to_string())
            .or_insert_with(|| ParticipantState::new(id, 0));
        p.pose = Some(Pose::at(Vec3::new(x, 0.0, 0.0), 1));
        room.can_hear_by_listener.entry(id.to_string()).or_default();
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn three_person_room() -> RoomState {
        let mut room = RoomState::new("room-a");
        place(&mut room, "a", 0.0);
        place(&mut room, "b", 5.0);
        place(&mut room, "c", 30.0);
        room
    }

    #[test]
    fn adds_nearby_participants_and_bumps_revision() {
        let mut room = three_person_room();
        let changed = recompute(&mut room, &DEFAULTS);

        assert_eq!(changed.get("a"), Some(&ids(&["b"])));
        assert_eq!(changed.get("b"), Some(&ids(&["a"])));
        assert!(!changed.contains_key("c"));
        assert_eq!(room.revision, 1);
    }

    #[test]
    fn second_pass_is_idempotent() {
        let mut room = three_person_room();
        recompute(&mut room, &DEFAULTS);
        let before = room.clone();

        let changed = recompute(&mut room, &DEFAULTS);
        assert!(changed.is_empty());
        assert_eq!(room, before);
    }

    #[test]
    fn hysteresis_keeps_previous_speakers_until_exit_radius() {
        let mut room = three_person_room();
        room.can_hear_by_listener.insert("a".into(), ids(&["b"]));
        place(&mut room, "b", 25.0);

        let changed = recompute(&mut room, &DEFAULTS);
        assert!(!changed.contains_key("a"));
        assert_eq!(room.can_hear("a"), ids(&["b"]));

        place(&mut room, "b", 27.0);
        let changed = recompute(&mut room, &DEFAULTS);
        assert_eq!(changed.get("a"), Some(&Vec::new()));
    }

    #[test]
    fn new_speakers_need_enter_radius() {
        let mut room = RoomState::new("r");
        place(&mut room, "a", 0.0);
        place(&mut room, "b", 25.0);
        let changed = recompute(&mut room, &DEFAULTS);
        assert!(changed.is_empty());
        assert_eq!(room.revision, 0);
    }

    #[test]
    fn truncation_orders_by_distance_then_id() {
        let mut room = RoomState::new("room-b");
        place(&mut room, "listener", 0.0);
        place(&mut room, "z", 1.0);
        place(&mut room, "a", 1.0);
        place(&mut room, "far", 2.0);

        let constants = PolicyConstants { max_subscribed_voices: 2, ..DEFAULTS };
        recompute(&mut room, &constants);

        assert_eq!(room.can_hear("listener"), ids(&["a", "z"]));
    }

    #[test]
    fn reorder_counts_as_change() {
        let mut room = RoomState::new("r");
        place(&mut room, "l", 0.0);
        place(&mut room, "x", 1.0);
        place(&mut room, "y", 2.0);
        recompute(&mut room, &DEFAULTS);
        assert_eq!(room.can_hear("l"), ids(&["x", "y"]));

        place(&mut room, "x", 3.0);
        let changed = recompute(&mut room, &DEFAULTS);
        assert_eq!(changed.get("l"), Some(&ids(&["y", "x"])));
        assert_eq!(room.revision, 2);
    }

    #[test]
    fn participants_without_pose_are_never_speakers() {
        let mut room = RoomState::new("r");
        place(&mut room, "a", 0.0);
        room.participants.insert("silent".into(), ParticipantState::new("silent", 0));

        let changed = recompute(&mut room, &DEFAULTS);
        assert!(changed.is_empty());
        assert_eq!(room.revision, 0);
        // never registered as a listener either, until something changes
        assert!(!room.can_hear_by_listener.contains_key("silent"));

        place(&mut room, "b", 1.0);
        recompute(&mut room, &DEFAULTS);
        assert_eq!(room.can_hear("a"), ids(&["b"]));
        assert_eq!(room.can_hear_by_listener.get("silent"), Some(&Vec::new()));
    }

    #[test]
    fn tiny_rooms_never_change() {
        let mut empty = RoomState::new("e");
        assert!(recompute(&mut empty, &DEFAULTS).is_empty());

        let mut solo = RoomState::new("s");
        place(&mut solo, "a", 0.0);
        assert!(recompute(&mut solo, &DEFAULTS).is_empty());
        assert_eq!(solo.revision, 0);
    }

    #[test]
    fn symmetric_from_empty_sets() {
        for d in [10.0, 24.0, 24.5, 40.0] {
            let mut room = RoomState::new("r");
            place(&mut room, "a", 0.0);
            place(&mut room, "b", d);
            recompute(&mut room, &DEFAULTS);
            assert_eq!(
                room.can_hear("a").contains(&"b".to_string()),
                room.can_hear("b").contains(&"a".to_string()),
                "distance {d}"
            );
        }
    }
}
