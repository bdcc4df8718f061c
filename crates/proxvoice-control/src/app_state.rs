//! Shared application state.
//!
//! Every component is built once here and shared by handlers, the socket
//! sessions and the scheduler. Startup errors are returned, never panicked.

use std::sync::Arc;

use proxvoice_core::error::Result;

use crate::config::{ControlConfig, EnforcementMode};
use crate::external::{LiveKitEnforcer, LiveKitTransport, LoggingEnforcer, TransportEnforcer, VoiceTransport};
use crate::obs::ControlMetrics;
use crate::policy::FixedWindowRateLimiter;
use crate::realtime::SocketHub;
use crate::room::RoomRegistry;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ControlConfig,
    rooms: Arc<RoomRegistry>,
    hub: Arc<SocketHub>,
    limiter: FixedWindowRateLimiter,
    metrics: Arc<ControlMetrics>,
    scheduler: Arc<Scheduler>,
    voice: Arc<dyn VoiceTransport>,
}

impl AppState {
    /// Default wiring: LiveKit credentials, enforcement per `transport.enforcement`.
    pub fn new(cfg: ControlConfig) -> Result<Self> {
        let voice = Arc::new(LiveKitTransport::new(&cfg.transport));
        let enforcer: Arc<dyn TransportEnforcer> = match cfg.transport.enforcement {
            EnforcementMode::Livekit => Arc::new(LiveKitEnforcer::new(&cfg.transport)?),
            EnforcementMode::Log => Arc::new(LoggingEnforcer),
        };
        Self::with_collaborators(cfg, voice, enforcer)
    }

    /// Wiring with explicit voice transport collaborators.
    pub fn with_collaborators(
        cfg: ControlConfig,
        voice: Arc<dyn VoiceTransport>,
        enforcer: Arc<dyn TransportEnforcer>,
    ) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(ControlMetrics::default());
        let rooms = Arc::new(RoomRegistry::new());
        let hub = Arc::new(SocketHub::new(Arc::clone(&rooms), Arc::clone(&metrics)));
        let scheduler = Arc::new(Scheduler::new(
            &cfg.policy,
            Arc::clone(&rooms),
            Arc::clone(&hub),
            enforcer,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                rooms,
                hub,
                limiter: FixedWindowRateLimiter::new(),
                metrics,
                scheduler,
                voice,
            }),
        })
    }

    pub fn cfg(&self) -> &ControlConfig {
        &self.inner.cfg
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.inner.rooms
    }

    pub fn hub(&self) -> Arc<SocketHub> {
        Arc::clone(&self.inner.hub)
    }

    pub fn limiter(&self) -> &FixedWindowRateLimiter {
        &self.inner.limiter
    }

    pub fn metrics(&self) -> &ControlMetrics {
        &self.inner.metrics
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    pub fn voice(&self) -> &dyn VoiceTransport {
        self.inner.voice.as_ref()
    }
}
