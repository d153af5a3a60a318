//! Middleware for the room service.
//!
//! # Components
//!
//! - `admission` - Room entry gate and participant check for room routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod admission;
pub mod http_metrics;

pub use admission::{require_admission, require_participant, Participant};
pub use http_metrics::http_metrics_middleware;
