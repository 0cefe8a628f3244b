//! Broadcast channel for job lifecycle events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every job
//! mutation publishes a [`JobEvent`] through the bus, and all WebSocket
//! connections subscribe to receive filtered events.

use tokio::sync::broadcast;

use super::JobEvent;

/// Broadcast bus for [`JobEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
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
    pub fn publish(&self, event: JobEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    ///
    /// Each WebSocket connection should call this once on connect.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
