//! Protocol modules (ingestion bodies + policy socket).
//!
//! - `pose`: spatial primitives carried through the system.
//! - `ingest`: request/response bodies of the session and pose endpoints,
//!   decoded and validated in one step.
//! - `socket`: the persistent policy channel (tagged-union inbound decode,
//!   outbound snapshot/delta/error messages, close codes).
//!
//! All decoders are panic-free: malformed input is reported as a structured
//! error instead of being partially accepted.

pub mod ingest;
pub mod pose;
pub mod socket;
