//! Redis-backed room store.
//!
//! # Key Patterns
//!
//! - `meta:{id}` - Room metadata (HASH: `created_at`, `participants`, `next_message_id`)
//! - `messages:{id}` - Message log (LIST of JSON records)
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so each operation clones it instead of locking.

use crate::errors::RoomError;
use crate::models::{Message, MessageDraft, RoomMeta};
use crate::observability::metrics::record_store_operation;
use crate::store::{lua_scripts, AdmitOutcome, RoomStore};
use async_trait::async_trait;
use common::types::{ParticipantToken, RoomId};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Redis room store.
#[derive(Clone)]
pub struct RedisRoomStore {
    connection: MultiplexedConnection,
    create_script: Script,
    admit_script: Script,
    append_script: Script,
    list_script: Script,
}

impl RedisRoomStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Store` if the URL is invalid or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, RoomError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may carry a password
            error!(target: "room.store.redis", error = %e, "Failed to open Redis client");
            RoomError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "room.store.redis", error = %e, "Failed to connect to Redis");
                RoomError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            create_script: Script::new(lua_scripts::CREATE_ROOM),
            admit_script: Script::new(lua_scripts::ADMIT_PARTICIPANT),
            append_script: Script::new(lua_scripts::APPEND_MESSAGE),
            list_script: Script::new(lua_scripts::LIST_MESSAGES),
        })
    }
}

/// Run a store operation and record its latency and outcome.
async fn timed<T>(
    operation: &'static str,
    fut: impl Future<Output = Result<T, RoomError>>,
) -> Result<T, RoomError> {
    let start = Instant::now();
    let result = fut.await;
    let status = if result.is_ok() { "success" } else { "error" };
    record_store_operation(operation, status, start.elapsed());
    result
}

fn store_error(operation: &str, room_id: &RoomId, e: &redis::RedisError) -> RoomError {
    warn!(
        target: "room.store.redis",
        error = %e,
        room_id = %room_id,
        operation,
        "Redis operation failed"
    );
    RoomError::Store(format!("{operation} failed: {e}"))
}

fn parse_meta(fields: &HashMap<String, String>) -> Result<RoomMeta, RoomError> {
    let created_at = fields
        .get("created_at")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| RoomError::Store("room metadata lacks created_at".to_string()))?;

    let participants = fields
        .get("participants")
        .map(|raw| {
            raw.split_whitespace()
                .filter_map(|t| ParticipantToken::parse(t).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(RoomMeta {
        created_at,
        participants,
    })
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn create_room(
        &self,
        room_id: &RoomId,
        created_at: i64,
        ttl: Duration,
    ) -> Result<bool, RoomError> {
        timed("create_room", async {
            let mut conn = self.connection.clone();
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

            let created: i64 = self
                .create_script
                .key(room_id.meta_key())
                .arg(created_at)
                .arg(ttl_ms)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| store_error("create_room", room_id, &e))?;

            debug!(target: "room.store.redis", room_id = %room_id, created = (created == 1), "Create room");
            Ok(created == 1)
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn room_meta(&self, room_id: &RoomId) -> Result<Option<RoomMeta>, RoomError> {
        timed("room_meta", async {
            let mut conn = self.connection.clone();

            let fields: HashMap<String, String> = conn
                .hgetall(room_id.meta_key())
                .await
                .map_err(|e| store_error("room_meta", room_id, &e))?;

            if fields.is_empty() {
                return Ok(None);
            }
            parse_meta(&fields).map(Some)
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn remaining_ttl(&self, room_id: &RoomId) -> Result<Option<Duration>, RoomError> {
        timed("remaining_ttl", async {
            let mut conn = self.connection.clone();

            // -2: key absent, -1: key without expiry (never written by this service)
            let pttl: i64 = conn
                .pttl(room_id.meta_key())
                .await
                .map_err(|e| store_error("remaining_ttl", room_id, &e))?;

            Ok(u64::try_from(pttl).ok().map(Duration::from_millis))
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn admit(
        &self,
        room_id: &RoomId,
        presented: Option<&ParticipantToken>,
        candidate: &ParticipantToken,
        capacity: usize,
    ) -> Result<AdmitOutcome, RoomError> {
        timed("admit", async {
            let mut conn = self.connection.clone();

            let code: i64 = self
                .admit_script
                .key(room_id.meta_key())
                .arg(presented.map_or("", ParticipantToken::expose))
                .arg(candidate.expose())
                .arg(capacity)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| store_error("admit", room_id, &e))?;

            match code {
                2 => Ok(AdmitOutcome::Reentered),
                1 => Ok(AdmitOutcome::Admitted),
                0 => Ok(AdmitOutcome::Full),
                -1 => Ok(AdmitOutcome::NotFound),
                other => Err(RoomError::Store(format!(
                    "unexpected admission result {other}"
                ))),
            }
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn append_message(
        &self,
        room_id: &RoomId,
        draft: MessageDraft,
    ) -> Result<Option<Message>, RoomError> {
        timed("append_message", async {
            let mut conn = self.connection.clone();
            let draft_json = serde_json::to_string(&draft)
                .map_err(|e| RoomError::Internal(format!("Failed to encode message: {e}")))?;

            let id: i64 = self
                .append_script
                .key(room_id.meta_key())
                .key(room_id.messages_key())
                .arg(draft_json)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| store_error("append_message", room_id, &e))?;

            if id == -1 {
                return Ok(None);
            }

            let id = u64::try_from(id)
                .map_err(|_| RoomError::Store(format!("unexpected message id {id}")))?;
            Ok(Some(draft.into_message(id)))
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn list_messages(&self, room_id: &RoomId) -> Result<Option<Vec<Message>>, RoomError> {
        timed("list_messages", async {
            let mut conn = self.connection.clone();

            let raw: Option<Vec<String>> = self
                .list_script
                .key(room_id.meta_key())
                .key(room_id.messages_key())
                .invoke_async(&mut conn)
                .await
                .map_err(|e| store_error("list_messages", room_id, &e))?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            raw.iter()
                .map(|entry| {
                    serde_json::from_str::<Message>(entry).map_err(|e| {
                        RoomError::Store(format!("corrupt message record: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        })
        .await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn destroy(&self, room_id: &RoomId) -> Result<bool, RoomError> {
        timed("destroy", async {
            let mut conn = self.connection.clone();
            let keys = vec![room_id.meta_key(), room_id.messages_key()];

            // One DEL covers both keys, so no reader can see one without the other.
            let removed: usize = conn
                .del(&keys)
                .await
                .map_err(|e| store_error("destroy", room_id, &e))?;

            debug!(target: "room.store.redis", room_id = %room_id, removed, "Destroyed room keys");
            Ok(removed > 0)
        })
        .await
    }

    async fn ping(&self) -> Result<(), RoomError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            warn!(target: "room.store.redis", error = %e, "Redis ping failed");
            RoomError::ServiceUnavailable(format!("Redis ping failed: {e}"))
        })?;
        Ok(())
    }
}
