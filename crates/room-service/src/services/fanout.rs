//! Realtime fan-out of room events.
//!
//! One `tokio::sync::broadcast` channel per room. The hub also remembers each
//! room's expiry deadline so the expiry sweeper can emit the destroy event the
//! store itself never announces.
//!
//! Publishing happens under the hub lock, which gives every room a single
//! publish order. A destroy event is sent and its channel dropped under the
//! same lock acquisition, so nothing can be published after it: later
//! publishes find no channel and are discarded, and receivers see the destroy
//! followed by end-of-stream.
//!
//! Each channel also carries an append gate. Message appends hold it across
//! the store write and the publish, so within one process subscribers see
//! messages in id order.

use crate::models::{DestroyReason, RoomEvent};
use crate::observability::metrics;
use common::types::RoomId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::{debug, warn};

struct RoomChannel {
    sender: broadcast::Sender<RoomEvent>,
    append_gate: Arc<AsyncMutex<()>>,
    expires_at: Instant,
}

/// Per-room event channels.
pub struct FanoutHub {
    channels: Mutex<HashMap<RoomId, RoomChannel>>,
    capacity: usize,
}

impl FanoutHub {
    /// `capacity` is the per-room buffer; subscribers that fall further
    /// behind are told to resync.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<RoomId, RoomChannel>> {
        // The map stays consistent even if a holder panicked mid-operation.
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a room, or refresh its deadline if already tracked.
    pub fn open(&self, room_id: &RoomId, remaining: Duration) {
        let expires_at = Instant::now() + remaining;
        let mut channels = self.channels();
        match channels.get_mut(room_id) {
            Some(channel) => channel.expires_at = expires_at,
            None => {
                let (sender, _) = broadcast::channel(self.capacity);
                channels.insert(
                    room_id.clone(),
                    RoomChannel {
                        sender,
                        append_gate: Arc::new(AsyncMutex::new(())),
                        expires_at,
                    },
                );
            }
        }
        metrics::set_tracked_channels(channels.len());
    }

    /// Subscribe to a tracked room. `None` if the room is not tracked.
    pub fn subscribe(&self, room_id: &RoomId) -> Option<Subscription> {
        let channels = self.channels();
        channels
            .get(room_id)
            .map(|channel| Subscription::new(channel.sender.subscribe()))
    }

    /// Gate serializing message appends for a tracked room.
    pub fn append_gate(&self, room_id: &RoomId) -> Option<Arc<AsyncMutex<()>>> {
        self.channels()
            .get(room_id)
            .map(|channel| Arc::clone(&channel.append_gate))
    }

    /// Deliver an event to every current subscriber of the room.
    ///
    /// Returns the number of receivers reached. Unknown rooms are a no-op.
    pub fn publish(&self, room_id: &RoomId, event: RoomEvent) -> usize {
        let mut channels = self.channels();
        send_locked(&mut channels, room_id, event).unwrap_or(0)
    }

    /// Publish the terminal destroy event and stop tracking the room.
    ///
    /// Returns `true` only for the caller that removed the channel. `false`
    /// if the room was not tracked (nothing is published).
    pub fn close(&self, room_id: &RoomId, reason: DestroyReason) -> bool {
        let mut channels = self.channels();
        send_locked(&mut channels, room_id, RoomEvent::Destroy { reason }).is_some()
    }

    pub fn is_tracked(&self, room_id: &RoomId) -> bool {
        self.channels().contains_key(room_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.channels().len()
    }

    /// Rooms whose deadline is at or before `now`.
    pub fn due_for_expiry(&self, now: Instant) -> Vec<RoomId> {
        self.channels()
            .iter()
            .filter(|(_, channel)| channel.expires_at <= now)
            .map(|(room_id, _)| room_id.clone())
            .collect()
    }
}

/// Send under an already held lock. `None` if the room has no channel.
fn send_locked(
    channels: &mut HashMap<RoomId, RoomChannel>,
    room_id: &RoomId,
    event: RoomEvent,
) -> Option<usize> {
    let Some(channel) = channels.get(room_id) else {
        debug!(target: "room.fanout", room_id = %room_id, event = event.name(), "No channel, event dropped");
        return None;
    };

    let name = event.name();
    let terminal = event.is_terminal();
    // Err only means nobody is listening right now.
    let delivered = channel.sender.send(event).unwrap_or(0);
    metrics::record_event_published(name);

    if terminal {
        channels.remove(room_id);
        metrics::set_tracked_channels(channels.len());
    }

    debug!(target: "room.fanout", room_id = %room_id, event = name, delivered, "Published event");
    Some(delivered)
}

/// What a subscriber receives next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Event(RoomEvent),
    /// The subscriber fell behind and missed this many events.
    Lagged(u64),
}

/// A live subscription to one room channel.
pub struct Subscription {
    receiver: broadcast::Receiver<RoomEvent>,
    finished: bool,
}

impl Subscription {
    fn new(receiver: broadcast::Receiver<RoomEvent>) -> Self {
        metrics::subscriber_connected();
        Self {
            receiver,
            finished: false,
        }
    }

    /// Wait for the next delivery. `None` after the destroy event.
    pub async fn next(&mut self) -> Option<Delivery> {
        if self.finished {
            return None;
        }

        match self.receiver.recv().await {
            Ok(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(Delivery::Event(event))
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(target: "room.fanout", missed, "Subscriber lagged, requesting resync");
                Some(Delivery::Lagged(missed))
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.finished = true;
                None
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        metrics::subscriber_disconnected();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn message(id: u64) -> RoomEvent {
        RoomEvent::Message(Message {
            id,
            sender: "a".to_string(),
            text: format!("m{id}"),
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = FanoutHub::new(16);
        let id = room("ordered");
        hub.open(&id, Duration::from_secs(60));
        let mut sub = hub.subscribe(&id).unwrap();

        for i in 1..=5 {
            hub.publish(&id, message(i));
        }

        for i in 1..=5 {
            assert_eq!(sub.next().await, Some(Delivery::Event(message(i))));
        }
    }

    #[tokio::test]
    async fn test_destroy_is_last_event() {
        let hub = FanoutHub::new(16);
        let id = room("terminal");
        hub.open(&id, Duration::from_secs(60));
        let mut first = hub.subscribe(&id).unwrap();
        let mut second = hub.subscribe(&id).unwrap();

        hub.publish(&id, message(1));
        assert!(hub.close(&id, DestroyReason::Explicit));
        // Late publish after destroy goes nowhere.
        assert_eq!(hub.publish(&id, message(2)), 0);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.next().await, Some(Delivery::Event(message(1))));
            assert_eq!(
                sub.next().await,
                Some(Delivery::Event(RoomEvent::Destroy {
                    reason: DestroyReason::Explicit
                }))
            );
            assert_eq!(sub.next().await, None);
        }

        assert!(!hub.is_tracked(&id));
        assert!(hub.subscribe(&id).is_none());
    }

    #[tokio::test]
    async fn test_close_untracked_room_is_noop() {
        let hub = FanoutHub::new(16);
        assert!(!hub.close(&room("ghost"), DestroyReason::Expired));
        assert_eq!(hub.tracked_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_reports_once() {
        let hub = Arc::new(FanoutHub::new(16));
        let id = room("contested");
        hub.open(&id, Duration::from_secs(60));
        let mut sub = hub.subscribe(&id).unwrap();

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let hub = Arc::clone(&hub);
                let id = id.clone();
                tokio::spawn(async move { hub.close(&id, DestroyReason::Explicit) })
            })
            .collect();

        let mut removed = 0;
        for closer in closers {
            if closer.await.unwrap() {
                removed += 1;
            }
        }
        assert_eq!(removed, 1);

        assert_eq!(
            sub.next().await,
            Some(Delivery::Event(RoomEvent::Destroy {
                reason: DestroyReason::Explicit
            }))
        );
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_append_gate_lives_with_channel() {
        let hub = FanoutHub::new(16);
        let id = room("gated");
        assert!(hub.append_gate(&id).is_none());

        hub.open(&id, Duration::from_secs(60));
        let gate = hub.append_gate(&id).unwrap();
        assert!(Arc::ptr_eq(&gate, &hub.append_gate(&id).unwrap()));

        hub.close(&id, DestroyReason::Explicit);
        assert!(hub.append_gate(&id).is_none());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = FanoutHub::new(16);
        let a = room("alpha");
        let b = room("bravo");
        hub.open(&a, Duration::from_secs(60));
        hub.open(&b, Duration::from_secs(60));
        let mut sub_b = hub.subscribe(&b).unwrap();

        hub.publish(&a, message(1));
        hub.close(&a, DestroyReason::Explicit);
        hub.publish(&b, message(9));

        assert_eq!(sub_b.next().await, Some(Delivery::Event(message(9))));
        assert!(hub.is_tracked(&b));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told_to_resync() {
        let hub = FanoutHub::new(2);
        let id = room("busy");
        hub.open(&id, Duration::from_secs(60));
        let mut sub = hub.subscribe(&id).unwrap();

        for i in 1..=5 {
            hub.publish(&id, message(i));
        }
        hub.close(&id, DestroyReason::Expired);

        assert!(matches!(sub.next().await, Some(Delivery::Lagged(_))));
        // The destroy event still arrives and still ends the stream.
        let mut saw_destroy = false;
        while let Some(delivery) = sub.next().await {
            if let Delivery::Event(RoomEvent::Destroy { .. }) = delivery {
                saw_destroy = true;
            }
        }
        assert!(saw_destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_for_expiry_tracks_deadlines() {
        let hub = FanoutHub::new(4);
        let short = room("short");
        let long = room("long");
        hub.open(&short, Duration::from_secs(5));
        hub.open(&long, Duration::from_secs(50));

        assert!(hub.due_for_expiry(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(hub.due_for_expiry(Instant::now()), vec![short.clone()]);

        // Refreshing the deadline takes the room off the due list.
        hub.open(&short, Duration::from_secs(30));
        assert!(hub.due_for_expiry(Instant::now()).is_empty());
        assert_eq!(hub.tracked_count(), 2);
    }
}
