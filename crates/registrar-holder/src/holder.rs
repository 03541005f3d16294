//! The reconciling holder: one per registry entity.
//!
//! [`InstanceHolder`] owns every copy of one entity in a [`SourceStore`]
//! and keeps a [`Snapshot`] of the copy subscribers currently see. Each
//! [`update`](InstanceHolder::update) and [`remove`](InstanceHolder::remove)
//! recomputes the snapshot and publishes zero, one, or two notifications.
//!
//! # Update rules
//!
//! | Current snapshot | Incoming write | Result |
//! |------------------|----------------|--------|
//! | none | any | snapshot = write, `Add` |
//! | non-local | local | promotion: snapshot = write, `Add` |
//! | same logical feed | any | snapshot = write, `Modify` if the diff is non-empty |
//! | other feed | any | copy stored, nothing published |
//!
//! # Removal rules
//!
//! | Removed copy | Next oldest copy | Result |
//! |--------------|------------------|--------|
//! | not the snapshot | -- | nothing published |
//! | snapshot | none | snapshot cleared, `Delete`, holder is empty |
//! | local snapshot | non-local | `Delete` then `Add` for the next copy |
//! | snapshot | any other | `Modify` if the diff is non-empty |
//!
//! Stale and duplicate removals (unknown feed, superseded incarnation) are
//! no-ops, so replayed or duplicated deliveries converge.

use core::fmt;
use std::sync::Arc;

use registrar_types::{ChangeNotification, Payload, SourceIdentity};
use tracing::debug;

use crate::metrics::RegistryMetrics;
use crate::sink::NotificationSink;
use crate::snapshot::Snapshot;
use crate::store::SourceStore;

/// Multi-source holder of one registry entity.
///
/// Not internally synchronized: the owner must apply all calls for one
/// entity in a single total order (a per-entity lock, a single-writer
/// task, or an event loop keyed by entity id).
pub struct InstanceHolder<P: Payload> {
    id: String,
    store: SourceStore<P>,
    snapshot: Option<Snapshot<P>>,
    sink: Arc<dyn NotificationSink<P>>,
    metrics: Arc<dyn RegistryMetrics>,
}

impl<P: Payload> InstanceHolder<P> {
    /// Create an empty holder for the entity `id`.
    pub fn new(
        id: impl Into<String>,
        sink: Arc<dyn NotificationSink<P>>,
        metrics: Arc<dyn RegistryMetrics>,
    ) -> Self {
        Self {
            id: id.into(),
            store: SourceStore::new(),
            snapshot: None,
            sink,
            metrics,
        }
    }

    /// Entity id.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Number of stored copies.
    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Whether no copy is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Currently visible payload.
    pub fn get(&self) -> Option<&P> {
        self.snapshot.as_ref().map(Snapshot::data)
    }

    /// Copy written by exactly `source`, whether or not it is visible.
    pub fn get_from(&self, source: &SourceIdentity) -> Option<&P> {
        self.store.get_exact(source)
    }

    /// Source of the currently visible payload.
    pub fn source(&self) -> Option<&SourceIdentity> {
        self.snapshot.as_ref().map(Snapshot::source)
    }

    /// Add notification describing the currently visible payload.
    pub fn change_notification(&self) -> Option<&ChangeNotification<P>> {
        self.snapshot.as_ref().map(Snapshot::notification)
    }

    /// Identities of all stored copies, in write order.
    pub fn sources(&self) -> Vec<SourceIdentity> {
        self.store.sources()
    }

    /// Store a copy of the entity written by `source`.
    pub fn update(&mut self, source: SourceIdentity, data: P) {
        if self.store.get_matching(&source).is_none() {
            self.metrics.increment_registration(source.origin());
        }
        self.store.put(source.clone(), data.clone());

        let incoming = Snapshot::new(source, data);
        let Some(current) = self.snapshot.take() else {
            debug!(id = %self.id, source = %incoming.source(), "First copy added");
            self.publish(incoming.notification().clone());
            self.snapshot = Some(incoming);
            return;
        };

        if !current.source().is_local() && incoming.source().is_local() {
            debug!(
                id = %self.id,
                from = %current.source(),
                to = %incoming.source(),
                "Local copy promoted to snapshot"
            );
            self.publish(incoming.notification().clone());
            self.snapshot = Some(incoming);
        } else if current.source().matches(incoming.source()) {
            let deltas = incoming.data().diff_older(current.data());
            if deltas.is_empty() {
                debug!(id = %self.id, source = %incoming.source(), "No-change update");
            } else {
                self.publish(ChangeNotification::Modify {
                    data: incoming.data().clone(),
                    deltas,
                    source: incoming.source().clone(),
                });
            }
            self.snapshot = Some(incoming);
        } else {
            debug!(
                id = %self.id,
                head = %current.source(),
                received = %incoming.source(),
                "Copy from non-authoritative source stored"
            );
            self.snapshot = Some(current);
        }
    }

    /// Remove the copy written by exactly `source`.
    ///
    /// Returns `true` when the last copy was removed; the owner should then
    /// discard this holder.
    pub fn remove(&mut self, source: &SourceIdentity) -> bool {
        let Some(removed) = self.store.remove(source) else {
            debug!(id = %self.id, %source, "No copy stored for source, remove ignored");
            return false;
        };
        self.metrics.increment_unregistration(source.origin());

        let is_authority = self
            .snapshot
            .as_ref()
            .is_some_and(|current| current.source().matches(source));
        if !is_authority {
            debug!(id = %self.id, %source, "Removed non-authoritative copy");
            return false;
        }

        let Some((next_source, next_data)) = self.store.oldest() else {
            self.snapshot = None;
            self.publish(ChangeNotification::Delete {
                data: removed,
                source: source.clone(),
            });
            debug!(id = %self.id, %source, "Removed last copy");
            return true;
        };

        let next = Snapshot::new(next_source.clone(), next_data.clone());
        if source.is_local() && !next.source().is_local() {
            self.publish(ChangeNotification::Delete {
                data: removed,
                source: source.clone(),
            });
            self.publish(next.notification().clone());
        } else {
            let deltas = next.data().diff_older(&removed);
            if deltas.is_empty() {
                debug!(id = %self.id, to = %next.source(), "Authority moved without change");
            } else {
                self.publish(ChangeNotification::Modify {
                    data: next.data().clone(),
                    deltas,
                    source: next.source().clone(),
                });
            }
        }

        debug!(id = %self.id, from = %source, to = %next.source(), "Authority moved to oldest copy");
        self.snapshot = Some(next);
        false
    }

    fn publish(&self, notification: ChangeNotification<P>) {
        self.sink.publish(notification);
    }
}

impl<P: Payload> fmt::Debug for InstanceHolder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHolder")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// One-line summary: id, visible source and payload, stored copy count.
impl<P: Payload> fmt::Display for InstanceHolder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHolder{{id={}, snapshot=", self.id)?;
        match &self.snapshot {
            Some(snapshot) => write!(
                f,
                "{{data={}, source={}}}",
                snapshot.data().summary(),
                snapshot.source()
            )?,
            None => f.write_str("none")?,
        }
        write!(f, ", copies={}}}", self.store.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use registrar_types::{
        ChangeKind, FieldChange, InstanceInfo, InstanceInfoBuilder, InstanceStatus, Origin,
    };

    use super::*;
    use crate::metrics::OriginCounters;
    use crate::sink::CollectingSink;

    struct Fixture {
        holder: InstanceHolder<InstanceInfo>,
        sink: Arc<CollectingSink<InstanceInfo>>,
        metrics: Arc<OriginCounters>,
    }

    fn fixture() -> Fixture {
        let sink: Arc<CollectingSink<InstanceInfo>> = Arc::new(CollectingSink::new());
        let metrics = Arc::new(OriginCounters::new());
        let holder: InstanceHolder<InstanceInfo> =
            InstanceHolder::new("i-1", sink.clone(), metrics.clone());
        Fixture {
            holder,
            sink,
            metrics,
        }
    }

    fn info(status: InstanceStatus) -> InstanceInfo {
        InstanceInfoBuilder::new("i-1").app("billing").status(status).build()
    }

    fn local(name: &str, id: &str) -> SourceIdentity {
        SourceIdentity::new(Origin::Local, name, id)
    }

    fn replica(name: &str, id: &str) -> SourceIdentity {
        SourceIdentity::new(Origin::Replicated, name, id)
    }

    fn kinds(notifications: &[ChangeNotification<InstanceInfo>]) -> Vec<ChangeKind> {
        notifications.iter().map(ChangeNotification::kind).collect()
    }

    #[test]
    fn new_holder_is_empty() {
        let f = fixture();
        assert!(f.holder.is_empty());
        assert!(f.holder.get().is_none());
        assert!(f.holder.source().is_none());
        assert!(f.holder.change_notification().is_none());
        assert_eq!(f.holder.id(), "i-1");
    }

    #[test]
    fn first_update_adds() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));

        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Add]);
        assert_eq!(f.holder.source(), Some(&replica("r1", "x1")));
        assert_eq!(f.holder.change_notification(), sent.first());
        assert_eq!(f.metrics.registrations(Origin::Replicated), 1);
    }

    #[test]
    fn update_to_authority_emits_modify_with_delta() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Down));

        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Add, ChangeKind::Modify]);
        let modify = sent.last().unwrap();
        let changes: Vec<&FieldChange> = modify.deltas().into_iter().map(|d| &d.change).collect();
        assert_eq!(changes, vec![&FieldChange::Status(InstanceStatus::Down)]);
        assert_eq!(f.holder.get().map(InstanceInfo::status), Some(InstanceStatus::Down));
        assert_eq!(f.metrics.registrations(Origin::Replicated), 1);
    }

    #[test]
    fn identical_update_is_silent() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));

        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Add]);
    }

    #[test]
    fn new_incarnation_of_authority_takes_over_snapshot() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r1", "x2"), info(InstanceStatus::Starting));

        assert_eq!(f.holder.size(), 1);
        assert_eq!(f.holder.source(), Some(&replica("r1", "x2")));
        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Add, ChangeKind::Modify]);

        // The superseded incarnation cannot remove its successor.
        assert!(!f.holder.remove(&replica("r1", "x1")));
        assert_eq!(f.holder.size(), 1);
        assert!(f.sink.is_empty());
        assert_eq!(f.metrics.unregistrations(Origin::Replicated), 0);
    }

    #[test]
    fn non_authoritative_write_is_stored_silently() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r2", "z1"), info(InstanceStatus::Down));

        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Add]);
        assert_eq!(f.holder.size(), 2);
        assert_eq!(f.holder.source(), Some(&replica("r1", "x1")));
        assert_eq!(
            f.holder.get_from(&replica("r2", "z1")).map(InstanceInfo::status),
            Some(InstanceStatus::Down)
        );
    }

    #[test]
    fn non_local_write_cannot_displace_local_authority() {
        let mut f = fixture();
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Down));
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::OutOfService));

        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Add]);
        assert_eq!(f.holder.source(), Some(&local("l1", "y1")));
    }

    #[test]
    fn second_local_feed_does_not_promote_over_local() {
        let mut f = fixture();
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        f.holder.update(local("l2", "y2"), info(InstanceStatus::Down));

        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Add]);
        assert_eq!(f.holder.source(), Some(&local("l1", "y1")));
    }

    #[test]
    fn removing_non_authoritative_copy_is_silent() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r2", "z1"), info(InstanceStatus::Down));
        f.sink.drain();

        assert!(!f.holder.remove(&replica("r2", "z1")));
        assert!(f.sink.is_empty());
        assert_eq!(f.holder.size(), 1);
        assert_eq!(f.metrics.unregistrations(Origin::Replicated), 1);
    }

    #[test]
    fn removing_unknown_source_is_noop() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.sink.drain();

        assert!(!f.holder.remove(&replica("r9", "x1")));
        assert!(f.sink.is_empty());
        assert_eq!(f.metrics.unregistrations(Origin::Replicated), 0);
    }

    #[test]
    fn removing_authority_hands_over_with_modify() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r2", "z1"), info(InstanceStatus::Down));
        f.sink.drain();

        assert!(!f.holder.remove(&replica("r1", "x1")));
        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Modify]);
        assert_eq!(sent.first().map(|n| n.source().clone()), Some(replica("r2", "z1")));
        assert_eq!(f.holder.source(), Some(&replica("r2", "z1")));
    }

    #[test]
    fn handover_between_identical_copies_is_silent() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r2", "z1"), info(InstanceStatus::Up));
        f.sink.drain();

        assert!(!f.holder.remove(&replica("r1", "x1")));
        assert!(f.sink.is_empty());
        assert_eq!(f.holder.source(), Some(&replica("r2", "z1")));
    }

    #[test]
    fn losing_local_authority_emits_delete_then_add() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        f.sink.drain();

        assert!(!f.holder.remove(&local("l1", "y1")));
        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Delete, ChangeKind::Add]);
        assert_eq!(sent.first().map(|n| n.source().clone()), Some(local("l1", "y1")));
        assert_eq!(sent.last().map(|n| n.source().clone()), Some(replica("r1", "x1")));
    }

    #[test]
    fn promotion_does_not_reorder_older_copies() {
        let mut f = fixture();
        f.holder.update(replica("r1", "x1"), info(InstanceStatus::Up));
        f.holder.update(replica("r2", "x1"), info(InstanceStatus::Down));
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Starting));
        assert_eq!(f.holder.source(), Some(&local("l1", "y1")));
        f.sink.drain();

        assert!(!f.holder.remove(&local("l1", "y1")));

        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Delete, ChangeKind::Add]);
        assert_eq!(sent.first().unwrap().source(), &local("l1", "y1"));
        assert_eq!(sent.last().unwrap().source(), &replica("r1", "x1"));
        assert_eq!(f.holder.source(), Some(&replica("r1", "x1")));
        assert_eq!(f.holder.sources(), vec![replica("r1", "x1"), replica("r2", "x1")]);
    }

    #[test]
    fn local_to_local_handover_uses_modify() {
        let mut f = fixture();
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        f.holder.update(local("l2", "y2"), info(InstanceStatus::Down));
        f.sink.drain();

        assert!(!f.holder.remove(&local("l1", "y1")));
        assert_eq!(kinds(&f.sink.drain()), vec![ChangeKind::Modify]);
        assert_eq!(f.holder.source(), Some(&local("l2", "y2")));
    }

    #[test]
    fn removing_last_copy_deletes() {
        let mut f = fixture();
        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        f.sink.drain();

        assert!(f.holder.remove(&local("l1", "y1")));
        let sent = f.sink.drain();
        assert_eq!(kinds(&sent), vec![ChangeKind::Delete]);
        assert!(f.holder.is_empty());
        assert!(f.holder.get().is_none());

        // A second remove of the same copy is a no-op.
        assert!(!f.holder.remove(&local("l1", "y1")));
        assert!(f.sink.is_empty());
        assert_eq!(f.metrics.unregistrations(Origin::Local), 1);
    }

    #[test]
    fn display_summarizes_snapshot() {
        let mut f = fixture();
        assert_eq!(f.holder.to_string(), "InstanceHolder{id=i-1, snapshot=none, copies=0}");

        f.holder.update(local("l1", "y1"), info(InstanceStatus::Up));
        assert_eq!(
            f.holder.to_string(),
            "InstanceHolder{id=i-1, snapshot={data=billing/i-1 [Up], source=LOCAL:l1:y1}, copies=1}"
        );
    }

    /// Random interleavings keep exactly one authority drawn from the store.
    #[test]
    #[allow(clippy::indexing_slicing)]
    fn random_sequences_keep_a_single_authority() {
        let origins = [Origin::Local, Origin::Replicated, Origin::Bootstrap];
        let names = ["a", "b"];
        let ids = ["1", "2"];
        let statuses = [InstanceStatus::Up, InstanceStatus::Down];

        for seed in 0..32_u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut f = fixture();

            for _ in 0..200 {
                let origin = origins[rng.random_range(0..origins.len())];
                let name = names[rng.random_range(0..names.len())];
                let id = ids[rng.random_range(0..ids.len())];
                let source = SourceIdentity::new(origin, name, id);

                if rng.random_bool(0.6) {
                    let status = statuses[rng.random_range(0..statuses.len())];
                    f.holder.update(source, info(status));
                } else {
                    let emptied = f.holder.remove(&source);
                    assert_eq!(emptied, (f.holder.is_empty() && !f.sink.is_empty()));
                }

                assert!(f.holder.store.is_consistent());
                match f.holder.source() {
                    None => assert!(f.holder.is_empty()),
                    Some(authority) => {
                        assert!(f.holder.get_from(authority).is_some());
                        assert_eq!(f.holder.get_from(authority), f.holder.get());
                    }
                }
                f.sink.drain();
            }
        }
    }
}
