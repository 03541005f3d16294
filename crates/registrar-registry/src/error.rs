//! Error types for the `registrar-registry` crate.
//!
//! Stale or duplicate writes and removals are not errors: the holders
//! treat them as no-ops. The only failure left is a lock poisoned by a
//! panic on another thread.

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A lock was poisoned by a panic while it was held.
    #[error("lock for {entity} poisoned: {reason}")]
    LockPoisoned {
        /// Entity id whose holder lock was poisoned, or `index` for the
        /// entity index itself.
        entity: String,
        /// Description of the poisoning.
        reason: String,
    },
}

impl RegistryError {
    pub(crate) fn poisoned(entity: &str, err: &impl core::fmt::Display) -> Self {
        Self::LockPoisoned {
            entity: entity.to_owned(),
            reason: err.to_string(),
        }
    }
}
