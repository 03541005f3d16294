//! Broadcast delivery of change notifications.
//!
//! [`BroadcastSink`] fans every notification out to all current
//! subscribers over a [`tokio::sync::broadcast`] channel. Publishing never
//! blocks. A subscriber that falls behind by more than the channel
//! capacity receives [`broadcast::error::RecvError::Lagged`] and skips to
//! the oldest retained notification.

use registrar_holder::NotificationSink;
use registrar_types::{ChangeNotification, Payload};
use tokio::sync::broadcast;

/// Multicast [`NotificationSink`] backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct BroadcastSink<P: Payload> {
    tx: broadcast::Sender<ChangeNotification<P>>,
}

impl<P: Payload> BroadcastSink<P> {
    /// Create a sink retaining up to `capacity` notifications per
    /// subscriber. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every notification published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification<P>> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<P: Payload> NotificationSink<P> for BroadcastSink<P> {
    fn publish(&self, notification: ChangeNotification<P>) {
        // send returns Err only when there are zero receivers,
        // which is normal before anyone subscribes.
        let delivered = self.tx.send(notification).unwrap_or(0);
        tracing::trace!(delivered, "Notification published");
    }
}
