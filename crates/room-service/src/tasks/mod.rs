//! Background tasks for the room service.
//!
//! # Tasks
//!
//! - `expiry_sweeper` - Announces the destruction of rooms whose TTL lapsed

pub mod expiry_sweeper;

pub use expiry_sweeper::start_expiry_sweeper;
