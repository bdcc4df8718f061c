//! proxvoice core: transport-agnostic contracts shared by the control plane,
//! its tests, and client tooling.
//!
//! This crate defines the wire model (poses, ingestion bodies), the policy
//! socket protocol, and the error surface. It intentionally carries no
//! transport or runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every fallible path surfaces as `ProxVoiceError`/`Result` (or a structured
//! `InboundError` on the socket lane) so hostile input never crashes the
//! process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ProxVoiceError, Result};
