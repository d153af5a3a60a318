//! Room handlers: create, enter, remaining lifetime, destroy.

use crate::errors::RoomError;
use crate::middleware::admission::token_from_cookies;
use crate::middleware::Participant;
use crate::models::{ttl_seconds, CreateRoomResponse, DestroyReason, RoomView, TtlResponse};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use common::types::RoomId;
use std::sync::Arc;
use tracing::instrument;

/// `POST /api/rooms`
#[instrument(skip_all, name = "room.handlers.create_room")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), RoomError> {
    let room_id = state.lifecycle.create().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id,
            ttl_seconds: state.lifecycle.ttl().as_secs(),
        }),
    ))
}

/// `GET /room/{roomId}`, behind the admission gate.
#[instrument(skip_all, name = "room.handlers.enter_room", fields(room_id = %participant.room_id))]
pub async fn enter_room(
    State(state): State<Arc<AppState>>,
    Extension(participant): Extension<Participant>,
) -> Result<Json<RoomView>, RoomError> {
    let room_id = participant.room_id;

    let meta = state
        .store
        .room_meta(&room_id)
        .await?
        .ok_or(RoomError::RoomNotFound)?;
    let remaining = state
        .lifecycle
        .remaining_ttl(&room_id)
        .await?
        .ok_or(RoomError::RoomNotFound)?;

    Ok(Json(RoomView {
        room_id,
        ttl_seconds: ttl_seconds(remaining),
        participant_count: meta.participants.len(),
    }))
}

/// `GET /api/rooms/{roomId}/ttl`
///
/// Ungated. `null` once the room is gone, however it went.
#[instrument(skip_all, name = "room.handlers.get_ttl")]
pub async fn get_ttl(
    State(state): State<Arc<AppState>>,
    Path(raw_room_id): Path<String>,
) -> Result<Json<TtlResponse>, RoomError> {
    let Ok(room_id) = RoomId::parse(&raw_room_id) else {
        return Ok(Json(TtlResponse { ttl_seconds: None }));
    };

    let remaining = state.lifecycle.remaining_ttl(&room_id).await?;
    Ok(Json(TtlResponse {
        ttl_seconds: remaining.map(ttl_seconds),
    }))
}

/// `DELETE /api/rooms/{roomId}`
///
/// Members only. A room that is already gone answers 204 as well.
#[instrument(skip_all, name = "room.handlers.destroy_room")]
pub async fn destroy_room(
    State(state): State<Arc<AppState>>,
    Path(raw_room_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, RoomError> {
    let Ok(room_id) = RoomId::parse(&raw_room_id) else {
        return Ok(StatusCode::NO_CONTENT);
    };
    let presented = token_from_cookies(&headers, &room_id);

    match state.admission.verify(&room_id, presented.as_ref()).await {
        Ok(_) => {
            state
                .lifecycle
                .destroy(&room_id, DestroyReason::Explicit)
                .await?;
        }
        Err(RoomError::RoomNotFound) => {
            // Lapsed while still tracked: subscribers still need their event.
            state
                .lifecycle
                .destroy(&room_id, DestroyReason::Expired)
                .await?;
        }
        Err(e) => return Err(e),
    }

    Ok(StatusCode::NO_CONTENT)
}
