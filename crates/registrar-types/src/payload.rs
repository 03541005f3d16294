//! The registry entry abstraction.

use std::collections::BTreeSet;

/// A versioned registry entry that can describe how it differs from an
/// older version of itself.
///
/// The reconciliation core never inspects payload fields. It only needs a
/// stable entity id and the field-level difference between two versions of
/// the same entity.
pub trait Payload: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// One field-level difference between two versions.
    type Delta: Clone + core::fmt::Debug + Ord + Send + Sync + 'static;

    /// Stable entity id. All versions of an entity share it.
    fn id(&self) -> &str;

    /// Field-level changes that turn `older` into `self`.
    ///
    /// An empty set means the two versions are observably identical.
    fn diff_older(&self, older: &Self) -> BTreeSet<Self::Delta>;

    /// Short human-readable description used in log lines.
    fn summary(&self) -> String {
        self.id().to_owned()
    }
}
