//! Periodic recompute + stale-participant reconciliation.
//!
//! Each tick walks every known room sequentially: first the stale sweep,
//! then recompute-and-enforce. Room state transitions, socket fan-out and
//! the enforcement submission all happen under the room lock, which keeps
//! per-room revisions ordered for sockets and the transport alike. None of
//! them block: sockets have bounded queues and enforcement is handed to the
//! `EnforcementQueue`, so a slow transport never delays the next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use proxvoice_core::protocol::socket::SocketErrorCode;

use crate::clock::now_ms;
use crate::config::PolicySection;
use crate::external::{EnforcementQueue, TransportEnforcer};
use crate::obs::ControlMetrics;
use crate::policy::{recompute, PolicyConstants};
use crate::realtime::SocketHub;
use crate::room::{RoomRegistry, SweepOutcome};

pub struct Scheduler {
    rooms: Arc<RoomRegistry>,
    hub: Arc<SocketHub>,
    enforcement: EnforcementQueue,
    metrics: Arc<ControlMetrics>,
    constants: PolicyConstants,
    period: Duration,
    grace_ms: u64,
    evict_empty_rooms: bool,
}

impl Scheduler {
    pub fn new(
        policy: &PolicySection,
        rooms: Arc<RoomRegistry>,
        hub: Arc<SocketHub>,
        enforcer: Arc<dyn TransportEnforcer>,
        metrics: Arc<ControlMetrics>,
    ) -> Self {
        Self {
            rooms,
            hub,
            enforcement: EnforcementQueue::new(enforcer, Arc::clone(&metrics)),
            metrics,
            constants: policy.constants(),
            period: policy.recompute_period(),
            grace_ms: policy.reconnect_grace_ms(),
            evict_empty_rooms: policy.evict_empty_rooms,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn enforcement(&self) -> &EnforcementQueue {
        &self.enforcement
    }

    /// One pass over every known room.
    pub fn tick(&self, now_ms: u64) {
        for room_id in self.rooms.room_ids() {
            self.sweep_room(&room_id, now_ms);
            self.recompute_and_enforce(&room_id);
        }
        self.metrics.rooms.set(self.rooms.len() as i64);
    }

    /// Evict participants silent for longer than the reconnect grace.
    pub fn sweep_room(&self, room_id: &str, now_ms: u64) -> SweepOutcome {
        let cutoff_ms = now_ms.saturating_sub(self.grace_ms);
        let swept = self.rooms.with_room(room_id, |room| {
            let outcome = room.evict_stale(cutoff_ms);
            if outcome.is_noop() {
                return outcome;
            }
            if outcome.changed.is_empty() {
                // Only the roster shrank; refresh everyone at the new revision.
                self.hub.publish_snapshots(room);
            } else {
                self.hub.publish_deltas(room_id, outcome.revision, &outcome.changed);
                self.enforcement
                    .submit(room_id, outcome.revision, room.can_hear_by_listener.clone());
            }
            self.hub.expel(room_id, &outcome.removed, SocketErrorCode::StaleSession);
            outcome
        });
        let Some(outcome) = swept else {
            return SweepOutcome::default();
        };
        if outcome.is_noop() {
            return outcome;
        }

        tracing::info!(
            room_id,
            removed = ?outcome.removed,
            changed = outcome.changed.len(),
            revision = outcome.revision,
            "evicted stale participants"
        );
        self.metrics.stale_evictions.add(&[], outcome.removed.len() as u64);

        if self.evict_empty_rooms && self.rooms.remove_if_empty(room_id) {
            tracing::info!(room_id, "evicted empty room");
        }

        outcome
    }

    /// Recompute audibility, fan out deltas, and dispatch enforcement.
    /// Returns the room revision afterwards, `None` for an unknown room.
    ///
    /// Deltas and the enforcement submission are queued before the room lock
    /// is released, so both observe revisions in order. A room whose last
    /// enforcement failed is re-submitted even when nothing changed.
    pub fn recompute_and_enforce(&self, room_id: &str) -> Option<u64> {
        let started = Instant::now();
        let (revision, changed, retried) = self.rooms.with_room(room_id, |room| {
            let changed = recompute(room, &self.constants);
            if !changed.is_empty() {
                self.hub.publish_deltas(room_id, room.revision, &changed);
            }
            let retried = changed.is_empty() && self.enforcement.needs_retry(room_id);
            if !changed.is_empty() || retried {
                self.enforcement
                    .submit(room_id, room.revision, room.can_hear_by_listener.clone());
            }
            (room.revision, changed.len(), retried)
        })?;
        self.metrics.recompute_duration.observe(started.elapsed());

        if changed == 0 {
            self.metrics.recompute_passes.inc(&[("changed", "false")]);
            if retried {
                tracing::debug!(room_id, revision, "retrying transport enforcement");
            }
            return Some(revision);
        }
        self.metrics.recompute_passes.inc(&[("changed", "true")]);
        tracing::debug!(room_id, revision, changed, "audibility changed");

        Some(revision)
    }

    /// Start the periodic loop.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.period;

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_ms = period.as_millis() as u64, "scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => self.tick(now_ms()),
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::info!("scheduler stopped");
        });

        SchedulerHandle { stop: stop_tx, join }
    }
}

/// Stops the scheduler loop on `shutdown`.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}
