//! Types shared by the room service and its test utilities.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for room identifiers and participant credentials
pub mod types;
