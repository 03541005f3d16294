//! Notification delivery.
//!
//! The holder hands every notification to a [`NotificationSink`] in the
//! order it was emitted and never waits for acknowledgment. What happens
//! when a subscriber cannot keep up is the sink's policy.

use std::sync::{Mutex, PoisonError};

use registrar_types::{ChangeNotification, Payload};

/// Ordered destination for the notifications of one or more holders.
pub trait NotificationSink<P: Payload>: Send + Sync {
    /// Accept one notification. Must not block on subscribers.
    fn publish(&self, notification: ChangeNotification<P>);
}

/// Any thread-safe callback is a sink.
impl<P, F> NotificationSink<P> for F
where
    P: Payload,
    F: Fn(ChangeNotification<P>) + Send + Sync,
{
    fn publish(&self, notification: ChangeNotification<P>) {
        self(notification);
    }
}

/// In-memory sink that keeps notifications in arrival order.
#[derive(Debug)]
pub struct CollectingSink<P: Payload> {
    received: Mutex<Vec<ChangeNotification<P>>>,
}

impl<P: Payload> Default for CollectingSink<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> CollectingSink<P> {
    /// Create an empty sink.
    pub const fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
        }
    }

    /// Take every notification received so far, oldest first.
    pub fn drain(&self) -> Vec<ChangeNotification<P>> {
        let mut received = self.received.lock().unwrap_or_else(PoisonError::into_inner);
        core::mem::take(&mut *received)
    }

    /// Number of notifications waiting to be drained.
    pub fn len(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is waiting to be drained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: Payload> NotificationSink<P> for CollectingSink<P> {
    fn publish(&self, notification: ChangeNotification<P>) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
