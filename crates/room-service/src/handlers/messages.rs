//! Message handlers. Both routes sit behind the participant gate.

use crate::errors::RoomError;
use crate::middleware::Participant;
use crate::models::{Message, MessageListResponse, SendMessageRequest};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// `GET /api/rooms/{roomId}/messages`
#[instrument(skip_all, name = "room.handlers.list_messages", fields(room_id = %participant.room_id))]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(participant): Extension<Participant>,
) -> Result<Json<MessageListResponse>, RoomError> {
    let messages = state.lifecycle.list_messages(&participant.room_id).await?;
    Ok(Json(MessageListResponse { messages }))
}

/// `POST /api/rooms/{roomId}/messages`
#[instrument(skip_all, name = "room.handlers.send_message", fields(room_id = %participant.room_id))]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(participant): Extension<Participant>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), RoomError> {
    let message = state
        .lifecycle
        .append_message(&participant.room_id, &request.sender, &request.text)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
