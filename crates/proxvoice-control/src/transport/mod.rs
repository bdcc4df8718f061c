//! Transport layer (policy WebSocket).
//!
//! Exposes the upgrade handler and the codec that maps raw WS messages to
//! typed client messages once, before the session loop acts on them.

pub mod codec;
pub mod ws;
