//! Policy layer (audibility decisions + ingestion rate limiting).
//!
//! `engine` turns poses into hysteresis-protected, capped audible lists;
//! `rate_limit` guards the ingestion endpoints with fixed windows.

pub mod engine;
pub mod rate_limit;

pub use engine::{recompute, ChangeSet, PolicyConstants};
pub use rate_limit::FixedWindowRateLimiter;
