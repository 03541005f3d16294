//! Registration metrics.
//!
//! Holders count a registration the first time a logical feed writes a
//! copy and an unregistration each time a copy is actually removed. The
//! counters are keyed by [`Origin`] only.

use std::sync::atomic::{AtomicU64, Ordering};

use registrar_types::Origin;

/// Registration and unregistration counters, by origin.
pub trait RegistryMetrics: Send + Sync {
    /// A logical feed wrote its first copy of an entity.
    fn increment_registration(&self, origin: Origin);

    /// A copy was removed from an entity.
    fn increment_unregistration(&self, origin: Origin);
}

/// One counter per origin.
#[derive(Debug, Default)]
struct PerOrigin {
    local: AtomicU64,
    replicated: AtomicU64,
    bootstrap: AtomicU64,
    interested: AtomicU64,
}

impl PerOrigin {
    const fn slot(&self, origin: Origin) -> &AtomicU64 {
        match origin {
            Origin::Local => &self.local,
            Origin::Replicated => &self.replicated,
            Origin::Bootstrap => &self.bootstrap,
            Origin::Interested => &self.interested,
        }
    }

    /// Increment and return the new value.
    fn increment(&self, origin: Origin) -> u64 {
        self.slot(origin)
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    fn get(&self, origin: Origin) -> u64 {
        self.slot(origin).load(Ordering::Relaxed)
    }
}

/// In-process [`RegistryMetrics`] backed by atomic counters.
///
/// Every increment is also emitted as a `tracing` event on the `metrics`
/// target.
#[derive(Debug, Default)]
pub struct OriginCounters {
    registrations: PerOrigin,
    unregistrations: PerOrigin,
}

impl OriginCounters {
    /// Create counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations counted for `origin`.
    pub fn registrations(&self, origin: Origin) -> u64 {
        self.registrations.get(origin)
    }

    /// Unregistrations counted for `origin`.
    pub fn unregistrations(&self, origin: Origin) -> u64 {
        self.unregistrations.get(origin)
    }
}

impl RegistryMetrics for OriginCounters {
    fn increment_registration(&self, origin: Origin) {
        let value = self.registrations.increment(origin);
        tracing::debug!(target: "metrics", metric = "registrations", %origin, value);
    }

    fn increment_unregistration(&self, origin: Origin) {
        let value = self.unregistrations.increment(origin);
        tracing::debug!(target: "metrics", metric = "unregistrations", %origin, value);
    }
}
