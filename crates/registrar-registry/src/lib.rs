//! Entity index, holder lifecycle, and notification fan-out for the
//! Registrar service registry.
//!
//! The reconciliation core in `registrar-holder` handles one entity at a
//! time and leaves three things to its owner: finding or creating the
//! holder for an entity id, serializing calls per entity, and discarding
//! a holder once its last copy is gone. This crate is that owner.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `registrar.yaml`.
//! - [`error`] -- [`RegistryError`].
//! - [`registry`] -- [`SourcedRegistry`]: the entity index.
//! - [`sink`] -- [`BroadcastSink`]: multicast delivery of notifications.

pub mod config;
pub mod error;
pub mod registry;
pub mod sink;

// Re-export primary types at crate root.
pub use config::{ConfigError, RegistryConfig};
pub use error::RegistryError;
pub use registry::SourcedRegistry;
pub use sink::BroadcastSink;
