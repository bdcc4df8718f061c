//! External collaborators at the edge of the control plane.
//!
//! - `voice`: issues connection credentials for the audio transport.
//! - `enforcer`: applies audibility decisions to the transport's
//!   subscriptions, one outstanding call per room.
//! - `livekit`: the server API enforcer used in production.

pub mod enforcer;
pub mod livekit;
pub mod voice;

pub use enforcer::{EnforcementQueue, LoggingEnforcer, TransportEnforcer};
pub use livekit::LiveKitEnforcer;
pub use voice::{LiveKitTransport, TransportCredentials, TransportGrant, VoiceTransport};
