//! Lightweight in-process metrics (dependency-free).
//!
//! Counters for inbound routing and reply correlation, stored as atomics and
//! rendered in Prometheus text format by `MessengerMetrics::render`.

pub mod metrics;

pub use metrics::MessengerMetrics;
