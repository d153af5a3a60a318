//! Room Service Library
//!
//! Ephemeral two-party chat rooms:
//!
//! - Rooms live for a fixed TTL and then vanish with every message in them
//! - At most two participants per room, admitted atomically
//! - Either participant can destroy the room early
//! - Messages and the destroy event are pushed to subscribers in order
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/admission.rs -> handlers/*.rs -> services/*.rs -> store/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Room gates and HTTP metrics
//! - `models` - Domain records, events, API bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Admission, lifecycle, fan-out
//! - `store` - Ephemeral store trait with Redis and in-memory backends
//! - `tasks` - Background tasks

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod store;
pub mod tasks;
