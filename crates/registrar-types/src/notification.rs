//! Change notifications emitted by the reconciliation core.
//!
//! Subscribers never see raw writes. They see a delta stream: an entity
//! appears ([`ChangeKind::Add`]), changes field by field
//! ([`ChangeKind::Modify`]), or disappears ([`ChangeKind::Delete`]). Each
//! notification is attributed to the [`SourceIdentity`] whose copy is (or
//! was) authoritative.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;
use crate::source::SourceIdentity;

/// Kind of a [`ChangeNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The entity became visible, or its authority changed identity.
    Add,
    /// The authoritative copy changed in some fields.
    Modify,
    /// The entity is no longer visible under the attributed source.
    Delete,
}

impl core::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Add => "Add",
            Self::Modify => "Modify",
            Self::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// A change to the externally visible view of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "snake_case",
    bound(
        serialize = "P: Serialize, P::Delta: Serialize",
        deserialize = "P: Deserialize<'de>, P::Delta: Deserialize<'de>"
    )
)]
pub enum ChangeNotification<P: Payload> {
    /// The full payload is now visible under `source`.
    Add {
        /// The visible payload.
        data: P,
        /// The authoritative source.
        source: SourceIdentity,
    },
    /// The visible payload changed; `deltas` lists the changed fields.
    Modify {
        /// The new visible payload.
        data: P,
        /// Non-empty set of field-level changes.
        deltas: BTreeSet<P::Delta>,
        /// The authoritative source.
        source: SourceIdentity,
    },
    /// The payload attributed to `source` is no longer visible.
    Delete {
        /// The last payload seen from `source`.
        data: P,
        /// The source whose copy was removed.
        source: SourceIdentity,
    },
}

impl<P: Payload> ChangeNotification<P> {
    /// Kind of this notification.
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Add { .. } => ChangeKind::Add,
            Self::Modify { .. } => ChangeKind::Modify,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Payload carried by this notification.
    pub const fn data(&self) -> &P {
        match self {
            Self::Add { data, .. } | Self::Modify { data, .. } | Self::Delete { data, .. } => data,
        }
    }

    /// Source the notification is attributed to.
    pub const fn source(&self) -> &SourceIdentity {
        match self {
            Self::Add { source, .. }
            | Self::Modify { source, .. }
            | Self::Delete { source, .. } => source,
        }
    }

    /// Field-level changes. Empty for `Add` and `Delete`.
    pub fn deltas(&self) -> Vec<&P::Delta> {
        match self {
            Self::Modify { deltas, .. } => deltas.iter().collect(),
            Self::Add { .. } | Self::Delete { .. } => Vec::new(),
        }
    }
}
