//! HTTP request handlers for the room service.

pub mod events;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod rooms;

pub use events::room_events;
pub use health::{health_check, readiness_check};
pub use messages::{list_messages, send_message};
pub use metrics::metrics_handler;
pub use rooms::{create_room, destroy_room, enter_room, get_ttl};
