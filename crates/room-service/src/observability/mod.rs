//! Observability for the room service.
//!
//! Prometheus metrics recorders. Tracing is configured in `main.rs`.

pub mod metrics;
