//! The entity index.
//!
//! [`SourcedRegistry`] maps entity ids to [`InstanceHolder`]s. Each holder
//! sits behind its own mutex, so calls for one entity are serialized while
//! calls for different entities proceed in parallel. Notifications are
//! published while the holder lock is held, which keeps each entity's
//! notification sequence in mutation order.
//!
//! # Lock order
//!
//! The index lock is never held while waiting for a holder lock. A remover
//! that empties a holder marks it retired and detaches it from the index
//! while still holding the holder lock. A writer that finds a retired
//! holder after acquiring its lock goes back to the index, where the entry
//! is already gone, and creates a fresh holder.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use registrar_holder::{InstanceHolder, RegistryMetrics};
use registrar_types::{ChangeNotification, Payload, SourceIdentity};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::sink::BroadcastSink;

/// Entity label used in errors about the index lock itself.
const INDEX: &str = "index";

struct Slot<P: Payload> {
    holder: InstanceHolder<P>,
    retired: bool,
}

type SharedSlot<P> = Arc<Mutex<Slot<P>>>;

/// Registry of entities reported by multiple sources.
pub struct SourcedRegistry<P: Payload> {
    index: RwLock<BTreeMap<String, SharedSlot<P>>>,
    sink: Arc<BroadcastSink<P>>,
    metrics: Arc<dyn RegistryMetrics>,
}

impl<P: Payload> SourcedRegistry<P> {
    /// Create an empty registry.
    pub fn new(config: &RegistryConfig, metrics: Arc<dyn RegistryMetrics>) -> Self {
        Self {
            index: RwLock::new(BTreeMap::new()),
            sink: Arc::new(BroadcastSink::new(config.notifications.buffer)),
            metrics,
        }
    }

    /// Subscribe to change notifications for every entity.
    ///
    /// Notifications published before the call are not replayed; combine
    /// with [`Self::for_snapshot`] to obtain a starting state.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification<P>> {
        self.sink.subscribe()
    }

    /// Record a copy of `data` written by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn register(&self, source: SourceIdentity, data: P) -> Result<(), RegistryError> {
        let id = data.id().to_owned();
        loop {
            let slot = self.slot_or_insert(&id)?;
            let mut guard = lock(&slot, &id)?;
            if guard.retired {
                debug!(id = %id, "Holder retired while waiting; retrying");
                continue;
            }
            guard.holder.update(source, data);
            return Ok(());
        }
    }

    /// Remove the copy of entity `id` written by `source`.
    ///
    /// Returns `true` when this removed the entity's last copy. Unknown
    /// ids and stale sources are no-ops returning `false`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn unregister(&self, id: &str, source: &SourceIdentity) -> Result<bool, RegistryError> {
        let Some(slot) = self.slot(id)? else {
            debug!(id, %source, "Unregister for unknown entity ignored");
            return Ok(false);
        };
        let mut guard = lock(&slot, id)?;
        self.remove_locked(id, &slot, &mut guard, source)
    }

    /// Remove every copy written by exactly `source` across all entities.
    ///
    /// Returns the number of copies removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn evict_source(&self, source: &SourceIdentity) -> Result<usize, RegistryError> {
        let mut evicted: usize = 0;
        for (id, slot) in self.slots()? {
            let mut guard = lock(&slot, &id)?;
            if guard.retired || guard.holder.get_from(source).is_none() {
                continue;
            }
            self.remove_locked(&id, &slot, &mut guard, source)?;
            evicted = evicted.saturating_add(1);
        }
        debug!(%source, evicted, "Source evicted");
        Ok(evicted)
    }

    /// Current authoritative payload of entity `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn get(&self, id: &str) -> Result<Option<P>, RegistryError> {
        self.read(id, |holder| holder.get().cloned())
    }

    /// Payload of entity `id` as written by `source`, authoritative or not.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn get_from(&self, id: &str, source: &SourceIdentity) -> Result<Option<P>, RegistryError> {
        self.read(id, |holder| holder.get_from(source).cloned())
    }

    /// One-line summary of the holder for entity `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn describe(&self, id: &str) -> Result<Option<String>, RegistryError> {
        self.read(id, |holder| Some(holder.to_string()))
    }

    /// Number of entities with at least one copy.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if the index lock was poisoned.
    pub fn size(&self) -> Result<usize, RegistryError> {
        let index = self
            .index
            .read()
            .map_err(|err| RegistryError::poisoned(INDEX, &err))?;
        Ok(index.len())
    }

    /// The current `Add` notification of every entity, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a lock was poisoned.
    pub fn for_snapshot(&self) -> Result<Vec<ChangeNotification<P>>, RegistryError> {
        let mut snapshot = Vec::new();
        for (id, slot) in self.slots()? {
            let guard = lock(&slot, &id)?;
            if guard.retired {
                continue;
            }
            if let Some(notification) = guard.holder.change_notification() {
                snapshot.push(notification.clone());
            }
        }
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn read<T>(
        &self,
        id: &str,
        f: impl FnOnce(&InstanceHolder<P>) -> Option<T>,
    ) -> Result<Option<T>, RegistryError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let guard = lock(&slot, id)?;
        if guard.retired {
            return Ok(None);
        }
        Ok(f(&guard.holder))
    }

    fn remove_locked(
        &self,
        id: &str,
        slot: &SharedSlot<P>,
        guard: &mut Slot<P>,
        source: &SourceIdentity,
    ) -> Result<bool, RegistryError> {
        if guard.retired {
            return Ok(false);
        }
        let emptied = guard.holder.remove(source);
        if emptied {
            guard.retired = true;
            self.detach(id, slot)?;
        }
        Ok(emptied)
    }

    fn slot(&self, id: &str) -> Result<Option<SharedSlot<P>>, RegistryError> {
        let index = self
            .index
            .read()
            .map_err(|err| RegistryError::poisoned(INDEX, &err))?;
        Ok(index.get(id).cloned())
    }

    fn slot_or_insert(&self, id: &str) -> Result<SharedSlot<P>, RegistryError> {
        if let Some(slot) = self.slot(id)? {
            return Ok(slot);
        }
        let mut index = self
            .index
            .write()
            .map_err(|err| RegistryError::poisoned(INDEX, &err))?;
        let slot = index.entry(id.to_owned()).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                holder: InstanceHolder::new(id, self.sink.clone(), self.metrics.clone()),
                retired: false,
            }))
        });
        Ok(Arc::clone(slot))
    }

    fn slots(&self) -> Result<Vec<(String, SharedSlot<P>)>, RegistryError> {
        let index = self
            .index
            .read()
            .map_err(|err| RegistryError::poisoned(INDEX, &err))?;
        Ok(index
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect())
    }

    /// Drop `slot` from the index unless a newer holder already replaced it.
    fn detach(&self, id: &str, slot: &SharedSlot<P>) -> Result<(), RegistryError> {
        let mut index = self
            .index
            .write()
            .map_err(|err| RegistryError::poisoned(INDEX, &err))?;
        if index.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            index.remove(id);
            debug!(id, "Holder retired");
        }
        Ok(())
    }
}

impl<P: Payload> core::fmt::Debug for SourcedRegistry<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourcedRegistry")
            .field("entities", &self.size().ok())
            .field("subscribers", &self.sink.subscriber_count())
            .finish_non_exhaustive()
    }
}

fn lock<'a, P: Payload>(
    slot: &'a SharedSlot<P>,
    id: &str,
) -> Result<MutexGuard<'a, Slot<P>>, RegistryError> {
    slot.lock().map_err(|err| RegistryError::poisoned(id, &err))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use registrar_holder::OriginCounters;
    use registrar_types::{ChangeKind, InstanceInfo, InstanceInfoBuilder, InstanceStatus, Origin};

    use super::*;

    fn registry() -> SourcedRegistry<InstanceInfo> {
        SourcedRegistry::new(&RegistryConfig::default(), Arc::new(OriginCounters::new()))
    }

    fn instance(id: &str, status: InstanceStatus) -> InstanceInfo {
        InstanceInfoBuilder::new(id).app("billing").status(status).build()
    }

    fn replica() -> SourceIdentity {
        SourceIdentity::new(Origin::Replicated, "r1", "x1")
    }

    fn local() -> SourceIdentity {
        SourceIdentity::new(Origin::Local, "l1", "y1")
    }

    #[test]
    fn register_creates_one_holder_per_entity() {
        let registry = registry();
        registry.register(replica(), instance("a", InstanceStatus::Up)).unwrap();
        registry.register(local(), instance("a", InstanceStatus::Up)).unwrap();
        registry.register(replica(), instance("b", InstanceStatus::Up)).unwrap();

        assert_eq!(registry.size().unwrap(), 2);
        assert_eq!(
            registry.get("a").unwrap().map(|i| i.status()),
            Some(InstanceStatus::Up)
        );
        assert!(registry.get_from("b", &local()).unwrap().is_none());
    }

    #[test]
    fn last_unregister_drops_the_entity() {
        let registry = registry();
        registry.register(replica(), instance("a", InstanceStatus::Up)).unwrap();

        assert!(registry.unregister("a", &replica()).unwrap());
        assert_eq!(registry.size().unwrap(), 0);
        assert!(registry.get("a").unwrap().is_none());
        assert!(registry.describe("a").unwrap().is_none());
    }

    #[test]
    fn unregister_unknown_entity_is_a_no_op() {
        let registry = registry();
        assert!(!registry.unregister("missing", &replica()).unwrap());
    }

    #[test]
    fn entity_can_return_after_removal() {
        let registry = registry();
        let mut rx = registry.subscribe();
        registry.register(replica(), instance("a", InstanceStatus::Up)).unwrap();
        registry.unregister("a", &replica()).unwrap();
        registry.register(local(), instance("a", InstanceStatus::Down)).unwrap();

        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|n| n.kind())
            .collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Delete, ChangeKind::Add]);
        assert_eq!(registry.size().unwrap(), 1);
    }

    #[test]
    fn evict_source_removes_only_that_incarnation() {
        let registry = registry();
        let restarted = SourceIdentity::new(Origin::Replicated, "r1", "x2");
        registry.register(replica(), instance("a", InstanceStatus::Up)).unwrap();
        registry.register(replica(), instance("b", InstanceStatus::Up)).unwrap();
        registry.register(local(), instance("b", InstanceStatus::Up)).unwrap();
        registry.register(restarted.clone(), instance("c", InstanceStatus::Up)).unwrap();

        assert_eq!(registry.evict_source(&replica()).unwrap(), 2);
        assert!(registry.get("a").unwrap().is_none());
        assert!(registry.get("b").unwrap().is_some());
        assert!(registry.get_from("c", &restarted).unwrap().is_some());
        assert_eq!(registry.size().unwrap(), 2);
        assert_eq!(registry.evict_source(&replica()).unwrap(), 0);
    }

    #[test]
    fn snapshot_lists_current_adds_sorted_by_id() {
        let registry = registry();
        registry.register(replica(), instance("b", InstanceStatus::Up)).unwrap();
        registry.register(replica(), instance("a", InstanceStatus::Up)).unwrap();
        registry.register(local(), instance("b", InstanceStatus::Down)).unwrap();

        let snapshot = registry.for_snapshot().unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|n| n.data().id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(snapshot.iter().all(|n| n.kind() == ChangeKind::Add));
        assert_eq!(snapshot.last().unwrap().source(), &local());
    }

    #[test]
    fn describe_summarizes_the_holder() {
        let registry = registry();
        registry.register(local(), instance("a", InstanceStatus::Up)).unwrap();
        let summary = registry.describe("a").unwrap().unwrap();
        assert!(summary.contains("id=a"));
        assert!(summary.contains("LOCAL:l1:y1"));
    }
}
