//! Realtime fan-out for policy sockets.
//!
//! The hub tracks one binding per live connection and renders policy state
//! changes as snapshot/delta messages on each binding's queue. Closing a
//! binding goes through a separate signal that a full queue cannot drop.

pub mod hub;

pub use hub::{close_message, BindingGuard, BindingId, Connection, ConnectionRx, SnapshotReply, SocketHub};
