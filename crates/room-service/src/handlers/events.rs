//! Server-Sent Events stream of a room's events.
//!
//! Frames are named after the event (`message`, `destroy`) and carry the JSON
//! envelope. The stream ends right after `destroy`. A subscriber that falls
//! behind the room's buffer gets a `resync` frame and should re-fetch the
//! message list.

use crate::errors::RoomError;
use crate::middleware::Participant;
use crate::models::{DestroyReason, RoomEvent};
use crate::routes::AppState;
use crate::services::{Delivery, Subscription};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::{self, Stream};
use std::sync::Arc;
use tracing::instrument;

enum Feed {
    Live(Subscription),
    Gone,
    Done,
}

fn event_frame(event: &RoomEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

fn resync_frame(missed: u64) -> Result<Event, axum::Error> {
    Event::default()
        .event("resync")
        .json_data(serde_json::json!({ "missed": missed }))
}

/// `GET /api/rooms/{roomId}/events`
#[instrument(skip_all, name = "room.handlers.room_events", fields(room_id = %participant.room_id))]
pub async fn room_events(
    State(state): State<Arc<AppState>>,
    Extension(participant): Extension<Participant>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, RoomError> {
    let room_id = participant.room_id;

    // The hub may not track the room yet, e.g. after a restart on Redis.
    let feed = match state.lifecycle.remaining_ttl(&room_id).await? {
        None => Feed::Gone,
        Some(remaining) => {
            state.fanout.open(&room_id, remaining);
            match state.fanout.subscribe(&room_id) {
                Some(subscription) => {
                    // Catch a destroy that landed before the subscription existed.
                    state.lifecycle.remaining_ttl(&room_id).await?;
                    Feed::Live(subscription)
                }
                None => Feed::Gone,
            }
        }
    };

    let stream = stream::unfold(feed, |feed| async move {
        match feed {
            Feed::Gone => {
                let destroy = RoomEvent::Destroy {
                    reason: DestroyReason::Expired,
                };
                Some((event_frame(&destroy), Feed::Done))
            }
            Feed::Done => None,
            Feed::Live(mut subscription) => match subscription.next().await? {
                Delivery::Event(event) => Some((event_frame(&event), Feed::Live(subscription))),
                Delivery::Lagged(missed) => {
                    Some((resync_frame(missed), Feed::Live(subscription)))
                }
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
