//! Ephemeral store for room metadata and message logs.
//!
//! Every room lives under two keys that share one lifetime:
//!
//! - `meta:{roomId}` - creation time, participant tokens, message counter
//! - `messages:{roomId}` - the message log
//!
//! The message log never has a clock of its own. Each write copies the
//! metadata's remaining TTL onto it and destruction removes both keys in one
//! command, so the log can never outlive the room.
//!
//! All mutators are single atomic store operations. Implementations must not
//! read-modify-write in application code.

pub mod lua_scripts;
pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisRoomStore;

use crate::errors::RoomError;
use crate::models::{Message, MessageDraft, RoomMeta};
use async_trait::async_trait;
use common::types::{ParticipantToken, RoomId};
use std::time::Duration;

/// Result of an atomic admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The presented token was already a member.
    Reentered,
    /// The candidate token took a free slot.
    Admitted,
    /// Every slot is held by another token.
    Full,
    /// No such room.
    NotFound,
}

impl AdmitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmitOutcome::Reentered => "reentered",
            AdmitOutcome::Admitted => "admitted",
            AdmitOutcome::Full => "full",
            AdmitOutcome::NotFound => "not_found",
        }
    }
}

/// Store contract used by the admission controller and the lifecycle manager.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Write fresh metadata with the given lifetime.
    ///
    /// Returns `false` without touching anything if the id is already taken.
    async fn create_room(
        &self,
        room_id: &RoomId,
        created_at: i64,
        ttl: Duration,
    ) -> Result<bool, RoomError>;

    /// Read the metadata; `None` once the room is gone.
    async fn room_meta(&self, room_id: &RoomId) -> Result<Option<RoomMeta>, RoomError>;

    /// Time left before the room expires; `None` once the room is gone.
    async fn remaining_ttl(&self, room_id: &RoomId) -> Result<Option<Duration>, RoomError>;

    /// Check membership and take a slot in one indivisible step.
    ///
    /// `presented` is the token the caller already holds, `candidate` the one
    /// to record if a slot is free.
    async fn admit(
        &self,
        room_id: &RoomId,
        presented: Option<&ParticipantToken>,
        candidate: &ParticipantToken,
        capacity: usize,
    ) -> Result<AdmitOutcome, RoomError>;

    /// Append to the log if the room still exists; `None` if it does not.
    async fn append_message(
        &self,
        room_id: &RoomId,
        draft: MessageDraft,
    ) -> Result<Option<Message>, RoomError>;

    /// Full log in append order; `None` if the room does not exist.
    async fn list_messages(&self, room_id: &RoomId) -> Result<Option<Vec<Message>>, RoomError>;

    /// Remove metadata and log together. Returns whether anything existed.
    async fn destroy(&self, room_id: &RoomId) -> Result<bool, RoomError>;

    /// Connectivity check for readiness.
    async fn ping(&self) -> Result<(), RoomError>;
}
