//! In-process room store.
//!
//! Same contract as the Redis store, held in one mutex-guarded map. Expiry is
//! lazy: an entry past its deadline is dropped by whichever call touches it
//! next, and reads treat it as absent. Deadlines use `tokio::time::Instant`
//! so tests can pause and advance the clock.
//!
//! Used for single-instance deployments (`STORE_BACKEND=memory`) and tests.

use crate::errors::RoomError;
use crate::models::{Message, MessageDraft, RoomMeta};
use crate::store::{AdmitOutcome, RoomStore};
use async_trait::async_trait;
use common::types::{ParticipantToken, RoomId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct RoomEntry {
    meta: RoomMeta,
    messages: Vec<Message>,
    next_message_id: u64,
    expires_at: Instant,
}

/// In-memory room store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rooms: Arc<Mutex<HashMap<RoomId, RoomEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RoomId, RoomEntry>>, RoomError> {
        self.rooms
            .lock()
            .map_err(|_| RoomError::Internal("memory store lock poisoned".to_string()))
    }

    /// Number of entries still held, expired ones included until touched.
    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }
}

/// Look up a room, evicting it first if its deadline has passed.
fn live_entry<'a>(
    rooms: &'a mut HashMap<RoomId, RoomEntry>,
    room_id: &RoomId,
) -> Option<&'a mut RoomEntry> {
    let now = Instant::now();
    if rooms.get(room_id).is_some_and(|entry| entry.expires_at <= now) {
        rooms.remove(room_id);
        return None;
    }
    rooms.get_mut(room_id)
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(
        &self,
        room_id: &RoomId,
        created_at: i64,
        ttl: Duration,
    ) -> Result<bool, RoomError> {
        let mut rooms = self.lock()?;
        if live_entry(&mut rooms, room_id).is_some() {
            return Ok(false);
        }

        rooms.insert(
            room_id.clone(),
            RoomEntry {
                meta: RoomMeta {
                    created_at,
                    participants: Vec::new(),
                },
                messages: Vec::new(),
                next_message_id: 0,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn room_meta(&self, room_id: &RoomId) -> Result<Option<RoomMeta>, RoomError> {
        let mut rooms = self.lock()?;
        Ok(live_entry(&mut rooms, room_id).map(|entry| entry.meta.clone()))
    }

    async fn remaining_ttl(&self, room_id: &RoomId) -> Result<Option<Duration>, RoomError> {
        let mut rooms = self.lock()?;
        Ok(live_entry(&mut rooms, room_id)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn admit(
        &self,
        room_id: &RoomId,
        presented: Option<&ParticipantToken>,
        candidate: &ParticipantToken,
        capacity: usize,
    ) -> Result<AdmitOutcome, RoomError> {
        let mut rooms = self.lock()?;
        let Some(entry) = live_entry(&mut rooms, room_id) else {
            return Ok(AdmitOutcome::NotFound);
        };

        if presented.is_some_and(|token| entry.meta.is_member(token)) {
            return Ok(AdmitOutcome::Reentered);
        }
        if entry.meta.participants.len() >= capacity {
            return Ok(AdmitOutcome::Full);
        }

        entry.meta.participants.push(candidate.clone());
        Ok(AdmitOutcome::Admitted)
    }

    async fn append_message(
        &self,
        room_id: &RoomId,
        draft: MessageDraft,
    ) -> Result<Option<Message>, RoomError> {
        let mut rooms = self.lock()?;
        let Some(entry) = live_entry(&mut rooms, room_id) else {
            return Ok(None);
        };

        entry.next_message_id += 1;
        let message = draft.into_message(entry.next_message_id);
        entry.messages.push(message.clone());
        Ok(Some(message))
    }

    async fn list_messages(&self, room_id: &RoomId) -> Result<Option<Vec<Message>>, RoomError> {
        let mut rooms = self.lock()?;
        Ok(live_entry(&mut rooms, room_id).map(|entry| entry.messages.clone()))
    }

    async fn destroy(&self, room_id: &RoomId) -> Result<bool, RoomError> {
        let mut rooms = self.lock()?;
        let existed = live_entry(&mut rooms, room_id).is_some();
        rooms.remove(room_id);
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), RoomError> {
        self.lock().map(|_| ())
    }
}
