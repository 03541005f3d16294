//! Per-entity multi-source reconciliation for the Registrar service registry.
//!
//! One registry entry (a service instance) may be written concurrently by
//! several independent feeds: the local registration client and any number
//! of peer replicas. This crate decides which copy is authoritative and
//! turns the raw writes into a minimal, ordered Add/Modify/Delete stream.
//!
//! # Architecture
//!
//! - [`store`] -- [`SourceStore`]: at most one copy per logical feed, kept
//!   in write order.
//! - [`snapshot`] -- [`Snapshot`]: the authoritative (source, payload) pair
//!   and its cached Add notification.
//! - [`holder`] -- [`InstanceHolder`]: applies the precedence and diffing
//!   policy on every update and removal and publishes notifications.
//! - [`sink`] -- [`NotificationSink`], where notifications are delivered.
//! - [`metrics`] -- [`RegistryMetrics`], registration and unregistration
//!   counters by origin.
//!
//! # Precedence
//!
//! The first copy written becomes authoritative. A local-origin copy takes
//! authority from a non-local one the moment it arrives. When the
//! authoritative copy is removed, the oldest surviving copy takes over.
//!
//! # Serialization
//!
//! [`InstanceHolder`] mutates through `&mut self` and is not internally
//! synchronized: all updates and removals for one entity must be applied
//! as a single ordered sequence. Holders of different entities share no
//! state.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use registrar_holder::{CollectingSink, InstanceHolder, OriginCounters};
//! use registrar_types::{ChangeKind, InstanceInfo, InstanceInfoBuilder, Origin, SourceIdentity};
//!
//! let sink = Arc::new(CollectingSink::<InstanceInfo>::new());
//! let metrics = Arc::new(OriginCounters::new());
//! let mut holder: InstanceHolder<InstanceInfo> =
//!     InstanceHolder::new("i-1", sink.clone(), metrics.clone());
//!
//! let replica = SourceIdentity::new(Origin::Replicated, "r1", "x1");
//! holder.update(replica.clone(), InstanceInfoBuilder::new("i-1").app("billing").build());
//!
//! let local = SourceIdentity::new(Origin::Local, "l1", "y1");
//! holder.update(local.clone(), InstanceInfoBuilder::new("i-1").app("billing").build());
//!
//! // The local copy was promoted even though its content is identical.
//! assert_eq!(holder.source(), Some(&local));
//! let kinds: Vec<ChangeKind> = sink.drain().iter().map(|n| n.kind()).collect();
//! assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Add]);
//! assert_eq!(metrics.registrations(Origin::Local), 1);
//! ```

pub mod holder;
pub mod metrics;
pub mod sink;
pub mod snapshot;
pub mod store;

// Re-export primary types at crate root.
pub use holder::InstanceHolder;
pub use metrics::{OriginCounters, RegistryMetrics};
pub use sink::{CollectingSink, NotificationSink};
pub use snapshot::Snapshot;
pub use store::SourceStore;
