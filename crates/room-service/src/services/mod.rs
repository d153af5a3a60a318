//! Room service business logic.
//!
//! - `admission`: who may enter a room
//! - `lifecycle`: create, expire, destroy, and message operations
//! - `fanout`: per-room event delivery

pub mod admission;
pub mod fanout;
pub mod lifecycle;

pub use admission::{Admission, AdmissionController};
pub use fanout::{Delivery, FanoutHub, Subscription};
pub use lifecycle::RoomLifecycle;
