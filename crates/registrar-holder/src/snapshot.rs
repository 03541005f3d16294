//! The authoritative view of an entity.

use registrar_types::{ChangeNotification, Payload, SourceIdentity};

/// The (source, payload) pair currently visible to subscribers.
///
/// Immutable once built. The pair is held inside its own Add notification,
/// which is built once here and handed out on creation and promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<P: Payload> {
    notification: ChangeNotification<P>,
}

impl<P: Payload> Snapshot<P> {
    /// Build a snapshot for `data` written by `source`.
    pub const fn new(source: SourceIdentity, data: P) -> Self {
        Self {
            notification: ChangeNotification::Add { data, source },
        }
    }

    /// Authoritative source.
    pub const fn source(&self) -> &SourceIdentity {
        self.notification.source()
    }

    /// Visible payload.
    pub const fn data(&self) -> &P {
        self.notification.data()
    }

    /// Add notification announcing this snapshot.
    pub const fn notification(&self) -> &ChangeNotification<P> {
        &self.notification
    }
}
