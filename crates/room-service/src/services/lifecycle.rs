//! Room lifecycle manager.
//!
//! Creates rooms with a fixed lifetime, reports how long they have left,
//! destroys them on request, and appends and lists their messages. Every
//! transition that other participants must see goes through the fan-out hub.

use crate::errors::RoomError;
use crate::models::{DestroyReason, Message, MessageDraft, RoomEvent, MAX_SENDER_LENGTH};
use crate::observability::metrics;
use crate::services::fanout::FanoutHub;
use crate::store::RoomStore;
use chrono::Utc;
use common::types::RoomId;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Base62 alphabet for room ids.
const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of generated room ids.
const ROOM_ID_LENGTH: usize = 12;

/// Random bytes behind a room id (72 bits).
const ROOM_ID_RANDOM_BYTES: usize = 9;

/// Attempts before giving up on finding an unused room id.
const MAX_ROOM_ID_COLLISION_RETRIES: usize = 3;

/// Owns the room state machine: live until expired or destroyed, never back.
#[derive(Clone)]
pub struct RoomLifecycle {
    store: Arc<dyn RoomStore>,
    fanout: Arc<FanoutHub>,
    ttl: Duration,
}

impl RoomLifecycle {
    pub fn new(store: Arc<dyn RoomStore>, fanout: Arc<FanoutHub>, ttl: Duration) -> Self {
        Self { store, fanout, ttl }
    }

    /// Lifetime given to every new room.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a room with no participants and no messages.
    ///
    /// # Errors
    ///
    /// Store failures, or `Internal` if no unused id turned up.
    #[instrument(skip_all)]
    pub async fn create(&self) -> Result<RoomId, RoomError> {
        for attempt in 0..MAX_ROOM_ID_COLLISION_RETRIES {
            let room_id = generate_room_id()?;
            let created_at = Utc::now().timestamp_millis();

            if self.store.create_room(&room_id, created_at, self.ttl).await? {
                self.fanout.open(&room_id, self.ttl);
                metrics::record_room_created();
                info!(
                    target: "room.lifecycle",
                    room_id = %room_id,
                    ttl_seconds = self.ttl.as_secs(),
                    "Room created"
                );
                return Ok(room_id);
            }

            warn!(target: "room.lifecycle", attempt = attempt + 1, "Room id collision, retrying");
        }

        Err(RoomError::Internal(
            "Failed to allocate a unique room id".to_string(),
        ))
    }

    /// Time left before the room expires, `None` once it is gone.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn remaining_ttl(&self, room_id: &RoomId) -> Result<Option<Duration>, RoomError> {
        let remaining = self.store.remaining_ttl(room_id).await?;
        if remaining.is_none() {
            self.observed_gone(room_id);
        }
        Ok(remaining)
    }

    /// Delete the room and everything in it, then tell its subscribers.
    ///
    /// Idempotent. Returns whether anything was torn down.
    #[instrument(skip_all, fields(room_id = %room_id, reason = reason.as_str()))]
    pub async fn destroy(&self, room_id: &RoomId, reason: DestroyReason) -> Result<bool, RoomError> {
        // Waits out an in-flight append so it cannot report the room as expired.
        let gate = self.fanout.append_gate(room_id);
        let _appends_done = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let tracked = gate.is_some();
        let removed = self.store.destroy(room_id).await?;
        let announced = self.fanout.close(room_id, reason);

        // Counted by whoever announced, or by the remover when no channel
        // was ever tracked here.
        if announced || (removed && !tracked) {
            metrics::record_room_destroyed(reason.as_str());
            info!(
                target: "room.lifecycle",
                room_id = %room_id,
                reason = reason.as_str(),
                "Room destroyed"
            );
        }
        Ok(removed || announced)
    }

    /// Append a message and push it to subscribers.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for a blank text, or a blank or overlong sender
    /// - `RoomNotFound` if the room is gone
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn append_message(
        &self,
        room_id: &RoomId,
        sender: &str,
        text: &str,
    ) -> Result<Message, RoomError> {
        let draft = MessageDraft {
            sender: validate_sender(sender)?,
            text: validate_text(text)?,
            timestamp: Utc::now().timestamp_millis(),
        };

        // Held through the publish so subscribers see ids in order.
        let gate = self.fanout.append_gate(room_id);
        let _in_order = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let Some(message) = self.store.append_message(room_id, draft).await? else {
            self.observed_gone(room_id);
            return Err(RoomError::RoomNotFound);
        };

        metrics::record_message_appended();
        debug!(target: "room.lifecycle", room_id = %room_id, message_id = message.id, "Message appended");
        self.fanout
            .publish(room_id, RoomEvent::Message(message.clone()));
        Ok(message)
    }

    /// All messages in append order.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room is gone.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn list_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, RoomError> {
        match self.store.list_messages(room_id).await? {
            Some(messages) => Ok(messages),
            None => {
                self.observed_gone(room_id);
                Err(RoomError::RoomNotFound)
            }
        }
    }

    /// Re-check rooms whose deadline passed and close the ones that are gone.
    ///
    /// A room still alive in the store (clock skew against Redis) gets its
    /// deadline refreshed instead. Returns the number of rooms closed.
    pub async fn sweep_expired(&self, now: tokio::time::Instant) -> Result<usize, RoomError> {
        let mut closed = 0;
        for room_id in self.fanout.due_for_expiry(now) {
            match self.store.remaining_ttl(&room_id).await? {
                Some(remaining) if !remaining.is_zero() => {
                    debug!(target: "room.lifecycle", room_id = %room_id, "Room outlived its deadline, refreshing");
                    self.fanout.open(&room_id, remaining);
                }
                _ => {
                    if self.destroy(&room_id, DestroyReason::Expired).await? {
                        closed += 1;
                    }
                }
            }
        }
        Ok(closed)
    }

    /// A read found the room missing while the hub may still track it.
    fn observed_gone(&self, room_id: &RoomId) {
        if self.fanout.close(room_id, DestroyReason::Expired) {
            metrics::record_room_destroyed(DestroyReason::Expired.as_str());
            info!(target: "room.lifecycle", room_id = %room_id, reason = "expired", "Room destroyed");
        }
    }
}

fn validate_sender(sender: &str) -> Result<String, RoomError> {
    let sender = sender.trim();
    if sender.is_empty() {
        return Err(RoomError::BadRequest("sender must not be blank".to_string()));
    }
    if sender.chars().count() > MAX_SENDER_LENGTH {
        return Err(RoomError::BadRequest(format!(
            "sender must be at most {MAX_SENDER_LENGTH} characters"
        )));
    }
    Ok(sender.to_string())
}

fn validate_text(text: &str) -> Result<String, RoomError> {
    if text.trim().is_empty() {
        return Err(RoomError::BadRequest("text must not be blank".to_string()));
    }
    Ok(text.to_string())
}

/// Generate a room id.
///
/// 12 base62 characters (72 bits of entropy) from the system CSPRNG. Always
/// exactly `ROOM_ID_LENGTH` characters, left-padded with '0'.
fn generate_room_id() -> Result<RoomId, RoomError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; ROOM_ID_RANDOM_BYTES];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "room.lifecycle", error = %e, "Failed to generate random bytes for room id");
        RoomError::Internal("RNG failure".to_string())
    })?;

    let mut value: u128 = 0;
    for &b in &bytes {
        value = (value << 8) | u128::from(b);
    }

    let mut id = Vec::with_capacity(ROOM_ID_LENGTH);
    for _ in 0..ROOM_ID_LENGTH {
        #[allow(clippy::cast_possible_truncation)] // always < 62
        let idx = (value % 62) as usize;
        let ch = BASE62_CHARS
            .get(idx)
            .ok_or_else(|| RoomError::Internal("Base62 index out of range".to_string()))?;
        id.push(*ch);
        value /= 62;
    }
    id.reverse();

    let id = String::from_utf8(id)
        .map_err(|_| RoomError::Internal("Room id contained invalid UTF-8".to_string()))?;
    RoomId::parse(&id).map_err(|e| RoomError::Internal(format!("Generated room id rejected: {e}")))
}
