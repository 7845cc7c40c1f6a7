//! # Events
//!
//! Module dedicated to the internal event bus. The frontends listen
//! on it to tear down live client sockets when a user logs out or
//! disappears.

use tokio::sync::broadcast;
use tracing::debug;

/// An internal bridge event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// Live connections authenticated against the given address must
    /// be closed.
    CloseConnection(String),

    /// The given user was logged out.
    Logout(String),
}

/// The broadcast bus carrying [`Event`]s between subsystems.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the given buffering capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emits an event to every subscriber.
    pub fn emit(&self, event: Event) {
        debug!(?event, "emitting event");

        // A send error only means nobody subscribed yet.
        let _ = self.tx.send(event);
    }

    /// Subscribes to the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
