//! Broadcast channel for relay events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The connection
//! layer publishes a [`RelayEvent`] for every registration, departure, and
//! decoded application frame; the surrounding application subscribes to
//! receive them. This is the callback boundary toward business handlers.

use tokio::sync::broadcast;

use crate::protocol::Frame;

/// Events emitted by the relay core toward the application layer.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A connection registered under `client_id`.
    Connected {
        /// Id asserted by the peer's connect message.
        client_id: String,
    },
    /// A connection left, either via a Close frame (synchronous) or a
    /// sweep that found its transport destroyed (asynchronous).
    Disconnected {
        /// Id the connection was registered under.
        client_id: String,
    },
    /// A decoded, non-close, non-heartbeat application frame arrived.
    Message {
        /// Sender id taken from the message envelope.
        client_id: String,
        /// The decoded frame as received.
        frame: Frame,
    },
}

/// Broadcast bus for [`RelayEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: RelayEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn connected(id: &str) -> RelayEvent {
        RelayEvent::Connected {
            client_id: id.to_string(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(connected("a")), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(connected("alice"));

        let Ok(RelayEvent::Connected { client_id }) = rx.recv().await else {
            panic!("expected a Connected event");
        };
        assert_eq!(client_id, "alice");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let count = bus.publish(connected("bob"));
        assert_eq!(count, 2);

        let Ok(RelayEvent::Connected { client_id: id1 }) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(RelayEvent::Connected { client_id: id2 }) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(id1, id2);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.receiver_count(), 0);

        let rx1 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
