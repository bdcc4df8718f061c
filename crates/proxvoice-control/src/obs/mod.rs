//! Lightweight in-process metrics.
//!
//! Counters, gauges and a fixed-bucket histogram stored as atomics and
//! rendered in Prometheus text format by the `/metrics` handler.

pub mod metrics;

pub use metrics::ControlMetrics;
