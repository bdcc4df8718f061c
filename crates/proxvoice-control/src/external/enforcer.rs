//! Transport enforcement dispatch.
//!
//! Enforcement is best-effort and eventually consistent: the in-memory
//! policy state has already advanced when a call is issued, and failures are
//! logged and counted. A room whose last call failed is marked dirty so the
//! scheduler re-submits its full map on the next tick.
//!
//! `EnforcementQueue` never blocks the caller. Per room it keeps at most one
//! call in flight; states submitted meanwhile are coalesced so only the
//! highest revision is applied once the in-flight call returns.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures_util::FutureExt;

use proxvoice_core::error::Result;

use crate::obs::ControlMetrics;
use crate::room::CanHearMap;

/// Applies audibility decisions onto the voice transport's subscriptions.
#[async_trait]
pub trait TransportEnforcer: Send + Sync {
    async fn enforce_room(&self, room_id: &str, can_hear_by_listener: &CanHearMap) -> Result<()>;
}

/// Enforcer that only records the intended subscription set in the log.
#[derive(Debug, Default)]
pub struct LoggingEnforcer;

#[async_trait]
impl TransportEnforcer for LoggingEnforcer {
    async fn enforce_room(&self, room_id: &str, can_hear_by_listener: &CanHearMap) -> Result<()> {
        for (listener, speakers) in can_hear_by_listener {
            tracing::debug!(room_id, listener = %listener, ?speakers, "subscription intent");
        }
        Ok(())
    }
}

struct Slot {
    in_flight: u64,
    pending: Option<(u64, CanHearMap)>,
}

/// Per-room serialized, coalescing dispatcher in front of an enforcer.
pub struct EnforcementQueue {
    enforcer: Arc<dyn TransportEnforcer>,
    // present <=> a drain task is running for the room
    slots: Arc<DashMap<String, Slot>>,
    // rooms whose most recent call failed
    dirty: Arc<DashSet<String>>,
    metrics: Arc<ControlMetrics>,
}

impl EnforcementQueue {
    pub fn new(enforcer: Arc<dyn TransportEnforcer>, metrics: Arc<ControlMetrics>) -> Self {
        Self {
            enforcer,
            slots: Arc::new(DashMap::new()),
            dirty: Arc::new(DashSet::new()),
            metrics,
        }
    }

    /// Queue `state` at `revision` for `room_id` and return immediately.
    ///
    /// A submission older than what is already in flight or pending is dropped.
    pub fn submit(&self, room_id: &str, revision: u64, state: CanHearMap) {
        let start = match self.slots.entry(room_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let slot = slot.get_mut();
                let newest = slot.pending.as_ref().map_or(slot.in_flight, |(rev, _)| *rev);
                if revision < newest {
                    tracing::debug!(room_id, revision, newest, "dropped outdated enforcement");
                    return;
                }
                if slot.pending.is_some() {
                    self.metrics.enforcements.inc(&[("outcome", "coalesced")]);
                }
                slot.pending = Some((revision, state));
                None
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Slot { in_flight: revision, pending: None });
                Some(state)
            }
        };

        if let Some(state) = start {
            tokio::spawn(drain(
                Arc::clone(&self.enforcer),
                Arc::clone(&self.slots),
                Arc::clone(&self.dirty),
                Arc::clone(&self.metrics),
                room_id.to_string(),
                revision,
                state,
            ));
        }
    }

    /// True when the last call for `room_id` failed and nothing newer is queued.
    pub fn needs_retry(&self, room_id: &str) -> bool {
        self.dirty.contains(room_id) && !self.slots.contains_key(room_id)
    }

    /// Rooms with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

async fn drain(
    enforcer: Arc<dyn TransportEnforcer>,
    slots: Arc<DashMap<String, Slot>>,
    dirty: Arc<DashSet<String>>,
    metrics: Arc<ControlMetrics>,
    room_id: String,
    mut revision: u64,
    mut state: CanHearMap,
) {
    loop {
        let res = AssertUnwindSafe(enforcer.enforce_room(&room_id, &state))
            .catch_unwind()
            .await;
        match res {
            Ok(Ok(())) => {
                metrics.enforcements.inc(&[("outcome", "ok")]);
                dirty.remove(&room_id);
            }
            Ok(Err(e)) => {
                metrics.enforcements.inc(&[("outcome", "error")]);
                dirty.insert(room_id.clone());
                tracing::error!(room_id = %room_id, revision, error = %e, "failed to enforce transport subscriptions");
            }
            Err(_) => {
                metrics.enforcements.inc(&[("outcome", "error")]);
                dirty.insert(room_id.clone());
                tracing::error!(room_id = %room_id, revision, "transport enforcer panicked");
            }
        }

        // Leave atomically when nothing is pending, otherwise pick up the newest state.
        if slots.remove_if(&room_id, |_, slot| slot.pending.is_none()).is_some() {
            break;
        }
        let next = slots.get_mut(&room_id).and_then(|mut slot| {
            let next = slot.pending.take();
            if let Some((rev, _)) = &next {
                slot.in_flight = *rev;
            }
            next
        });
        match next {
            Some((rev, next)) => {
                revision = rev;
                state = next;
            }
            None => break,
        }
    }
}
