//! Proximity voice control plane.
//!
//! Wires ingestion (sessions, pose batches), the room registry, the
//! audibility engine and scheduler, policy socket fan-out, and transport
//! enforcement into one service. Consumed by the binary (`main.rs`) and by
//! integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod api;
pub mod app_state;
pub mod auth;
pub mod clock;
pub mod config;
pub mod external;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod realtime;
pub mod room;
pub mod router;
pub mod scheduler;
pub mod transport;
