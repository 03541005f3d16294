//! Write-feed identity.
//!
//! Every write into the registry is attributed to a [`SourceIdentity`]:
//! the triple (origin, logical name, incarnation id). Two views of that
//! triple matter to the reconciliation core:
//!
//! - **Exact identity** -- all three fields. This is the store's primary
//!   key and guards removals against superseded incarnations.
//! - **Logical key** ([`SourceKey`]) -- origin and name only. A feed that
//!   reconnects keeps its logical key but gets a new incarnation id.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a write feed, used to decide authority precedence.
///
/// Only [`Origin::Local`] is special: a local copy always wins over any
/// non-local copy of the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Written by a registration client connected to this node.
    Local,
    /// Copied from a peer replica.
    Replicated,
    /// Loaded from a bootstrap source at startup.
    Bootstrap,
    /// Received through an interest subscription to another registry.
    Interested,
}

impl Origin {
    /// Every origin, in declaration order.
    pub const ALL: [Self; 4] = [Self::Local, Self::Replicated, Self::Bootstrap, Self::Interested];

    /// Whether this origin is the authoritative local feed class.
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }

    /// Upper-case wire name of the origin.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Replicated => "REPLICATED",
            Self::Bootstrap => "BOOTSTRAP",
            Self::Interested => "INTERESTED",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical key of a write feed: origin and name, ignoring the incarnation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    /// Feed class.
    pub origin: Origin,
    /// Feed name, stable across reconnects.
    pub name: String,
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.name)
    }
}

/// Identity of one write feed incarnation.
///
/// Immutable once constructed. Equality, ordering, and hashing cover all
/// three fields (exact identity); use [`SourceIdentity::matches`] for the
/// logical comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    origin: Origin,
    name: String,
    id: String,
}

impl SourceIdentity {
    /// Create an identity from its three parts.
    pub fn new(origin: Origin, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            origin,
            name: name.into(),
            id: id.into(),
        }
    }

    /// Create an identity for a new incarnation of the named feed.
    ///
    /// The incarnation id is a time-ordered UUID v7, so a reconnecting
    /// feed never collides with its previous incarnation.
    pub fn fresh(origin: Origin, name: impl Into<String>) -> Self {
        Self::new(origin, name, Uuid::now_v7().to_string())
    }

    /// Feed class.
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Feed name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Incarnation id.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Logical key (origin and name) of this identity.
    pub fn key(&self) -> SourceKey {
        SourceKey {
            origin: self.origin,
            name: self.name.clone(),
        }
    }

    /// Whether `other` belongs to the same logical feed, ignoring the
    /// incarnation id.
    pub fn matches(&self, other: &Self) -> bool {
        self.origin == other.origin && self.name == other.name
    }

    /// Whether this identity was written by the local feed class.
    pub const fn is_local(&self) -> bool {
        self.origin.is_local()
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.name, self.id)
    }
}
