//! Replay scripts.
//!
//! A script is a YAML document with a list of steps, each one a
//! registration, an unregistration, or the eviction of every copy a
//! source incarnation wrote:
//!
//! ```yaml
//! steps:
//!   - register:
//!       source: { origin: REPLICATED, name: r1, id: x1 }
//!       instance: { id: i-42, app: checkout, status: UP }
//!   - unregister:
//!       id: i-42
//!       source: { origin: REPLICATED, name: r1, id: x1 }
//!   - evict:
//!       source: { origin: REPLICATED, name: r1, id: x1 }
//! ```

use std::path::Path;

use registrar_registry::SourcedRegistry;
use registrar_types::{InstanceInfo, SourceIdentity};
use serde::Deserialize;
use tracing::debug;

use crate::error::ReplayError;

/// A parsed replay script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Script {
    /// Steps in execution order, each a single-key map naming the step.
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

/// One registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Record a copy of `instance` written by `source`.
    Register {
        /// Writer of the copy.
        source: SourceIdentity,
        /// The copy.
        instance: Box<InstanceInfo>,
    },
    /// Remove the copy of entity `id` written by `source`.
    Unregister {
        /// Entity id.
        id: String,
        /// Writer of the copy.
        source: SourceIdentity,
    },
    /// Remove every copy written by `source`.
    Evict {
        /// Source incarnation to evict.
        source: SourceIdentity,
    },
}

/// Counts gathered while applying a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Steps applied.
    pub steps: usize,
    /// Entities whose last copy was removed.
    pub entities_removed: usize,
    /// Copies removed by evictions.
    pub copies_evicted: usize,
}

impl Script {
    /// Load a script from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ScriptIo`] if the file cannot be read, or
    /// [`ReplayError::ScriptYaml`] if it is not a valid script.
    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ReplayError::ScriptIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a script from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ScriptYaml`] if the string is not a valid script.
    pub fn parse(yaml: &str) -> Result<Self, ReplayError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply every step to `registry` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Registry`] for the first registry failure.
    pub fn apply(
        &self,
        registry: &SourcedRegistry<InstanceInfo>,
    ) -> Result<ReplayReport, ReplayError> {
        let mut report = ReplayReport::default();
        for step in &self.steps {
            match step {
                Step::Register { source, instance } => {
                    debug!(%source, id = instance.id(), "Register");
                    registry.register(source.clone(), InstanceInfo::clone(instance))?;
                }
                Step::Unregister { id, source } => {
                    debug!(%source, id, "Unregister");
                    if registry.unregister(id, source)? {
                        report.entities_removed = report.entities_removed.saturating_add(1);
                    }
                }
                Step::Evict { source } => {
                    let evicted = registry.evict_source(source)?;
                    report.copies_evicted = report.copies_evicted.saturating_add(evicted);
                }
            }
            report.steps = report.steps.saturating_add(1);
        }
        Ok(report)
    }
}
