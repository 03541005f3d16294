//! Shared type definitions for the Registrar service registry.
//!
//! This crate is the single source of truth for the values that flow
//! between write feeds, the per-entity reconciliation core, and registry
//! subscribers.
//!
//! # Modules
//!
//! - [`source`] -- Write-feed identity: [`Origin`], [`SourceKey`], and
//!   [`SourceIdentity`].
//! - [`payload`] -- The [`Payload`] trait every registry entry implements.
//! - [`notification`] -- [`ChangeNotification`], the only externally
//!   observable output of the reconciliation core.
//! - [`instance`] -- [`InstanceInfo`], the service-instance payload, and its
//!   field-level [`Delta`] set.

pub mod instance;
pub mod notification;
pub mod payload;
pub mod source;

// Re-export all public types at crate root for convenience.
pub use instance::{Delta, DeltaError, FieldChange, InstanceInfo, InstanceInfoBuilder, InstanceStatus};
pub use notification::{ChangeKind, ChangeNotification};
pub use payload::Payload;
pub use source::{Origin, SourceIdentity, SourceKey};
