//! Room service models.
//!
//! Domain records stored in the ephemeral store, the events pushed to
//! subscribers, and the JSON bodies of the HTTP API.

use common::types::{ParticipantToken, RoomId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum participants per room.
pub const ROOM_CAPACITY: usize = 2;

/// Maximum length of a sender display name, in characters.
pub const MAX_SENDER_LENGTH: usize = 64;

/// Whole seconds left, rounded up so a live room never reports zero.
pub fn ttl_seconds(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}

/// A chat message. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Per-room counter, starting at 1.
    pub id: u64,

    /// Display identity chosen by the client.
    pub sender: String,

    pub text: String,

    /// Server write time, unix milliseconds.
    pub timestamp: i64,
}

/// A message before the store assigns its id.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDraft {
    pub sender: String,
    pub text: String,
    pub timestamp: i64,
}

impl MessageDraft {
    pub fn into_message(self, id: u64) -> Message {
        Message {
            id,
            sender: self.sender,
            text: self.text,
            timestamp: self.timestamp,
        }
    }
}

/// Room metadata as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMeta {
    /// Unix milliseconds, set once at creation.
    pub created_at: i64,

    /// Admitted tokens in admission order.
    pub participants: Vec<ParticipantToken>,
}

impl RoomMeta {
    pub fn is_member(&self, token: &ParticipantToken) -> bool {
        self.participants.iter().any(|p| p == token)
    }
}

/// Why a room reached the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// A participant asked for it.
    Explicit,

    /// The TTL elapsed.
    Expired,
}

impl DestroyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyReason::Explicit => "explicit",
            DestroyReason::Expired => "expired",
        }
    }
}

/// Event published on a room channel.
///
/// Serializes as `{"event": "message" | "destroy", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RoomEvent {
    Message(Message),
    Destroy { reason: DestroyReason },
}

impl RoomEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Message(_) => "message",
            RoomEvent::Destroy { .. } => "destroy",
        }
    }

    /// Nothing follows a terminal event on its channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomEvent::Destroy { .. })
    }
}

// ============================================================================
// API Models
// ============================================================================

/// Response body for `POST /api/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub ttl_seconds: u64,
}

/// Response body for the gated `GET /room/{roomId}` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub room_id: RoomId,
    pub ttl_seconds: u64,
    pub participant_count: usize,
}

/// Response body for `GET /api/rooms/{roomId}/ttl`.
///
/// `ttl_seconds` is `null` once the room is gone, whatever the cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlResponse {
    pub ttl_seconds: Option<u64>,
}

/// Request body for `POST /api/rooms/{roomId}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub text: String,
}

/// Response body for `GET /api/rooms/{roomId}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
