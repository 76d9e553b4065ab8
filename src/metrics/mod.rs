//! Metrics export.
//!
//! Pushes per-target expiry gauges to external monitoring. Currently
//! supports the Prometheus Push Gateway.

pub mod prom;
