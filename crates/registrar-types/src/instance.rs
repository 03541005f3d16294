//! Service-instance payload and its field-level deltas.
//!
//! [`InstanceInfo`] is the record a registration client publishes for one
//! running service instance. Two versions of the same instance are
//! compared with [`Payload::diff_older`], which yields one [`Delta`] per
//! changed field; [`InstanceInfo::apply_delta`] replays a delta onto an
//! older version.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// Errors that can occur when applying a delta to an instance.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// The delta was computed for a different instance.
    #[error("delta for instance {delta_id} cannot be applied to instance {instance_id}")]
    IdMismatch {
        /// Id carried by the delta.
        delta_id: String,
        /// Id of the instance the delta was applied to.
        instance_id: String,
    },
}

/// Lifecycle status reported by a service instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Ready to receive traffic.
    Up,
    /// Not serving.
    Down,
    /// Booting; not yet ready for traffic.
    Starting,
    /// Taken out of rotation by an operator.
    OutOfService,
    /// Status not reported.
    #[default]
    Unknown,
}

/// A registered service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    id: String,
    #[serde(default)]
    app: Option<String>,
    #[serde(default)]
    app_group: Option<String>,
    #[serde(default)]
    asg: Option<String>,
    #[serde(default)]
    vip_address: Option<String>,
    #[serde(default)]
    secure_vip_address: Option<String>,
    #[serde(default)]
    ports: BTreeSet<u16>,
    #[serde(default)]
    status: InstanceStatus,
    #[serde(default)]
    home_page_url: Option<String>,
    #[serde(default)]
    status_page_url: Option<String>,
    #[serde(default)]
    health_check_urls: BTreeSet<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl InstanceInfo {
    /// Instance id.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Application name.
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// Application group.
    pub fn app_group(&self) -> Option<&str> {
        self.app_group.as_deref()
    }

    /// Auto-scaling group.
    pub fn asg(&self) -> Option<&str> {
        self.asg.as_deref()
    }

    /// Virtual address clients resolve to reach the application.
    pub fn vip_address(&self) -> Option<&str> {
        self.vip_address.as_deref()
    }

    /// Secure virtual address.
    pub fn secure_vip_address(&self) -> Option<&str> {
        self.secure_vip_address.as_deref()
    }

    /// Listening ports.
    pub const fn ports(&self) -> &BTreeSet<u16> {
        &self.ports
    }

    /// Reported status.
    pub const fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Home page URL.
    pub fn home_page_url(&self) -> Option<&str> {
        self.home_page_url.as_deref()
    }

    /// Status page URL.
    pub fn status_page_url(&self) -> Option<&str> {
        self.status_page_url.as_deref()
    }

    /// Health check URLs.
    pub const fn health_check_urls(&self) -> &BTreeSet<String> {
        &self.health_check_urls
    }

    /// Free-form metadata.
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Apply one field-level delta in place.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::IdMismatch`] if the delta was computed for a
    /// different instance.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<(), DeltaError> {
        if delta.id != self.id {
            return Err(DeltaError::IdMismatch {
                delta_id: delta.id.clone(),
                instance_id: self.id.clone(),
            });
        }

        match &delta.change {
            FieldChange::App(v) => self.app.clone_from(v),
            FieldChange::AppGroup(v) => self.app_group.clone_from(v),
            FieldChange::Asg(v) => self.asg.clone_from(v),
            FieldChange::VipAddress(v) => self.vip_address.clone_from(v),
            FieldChange::SecureVipAddress(v) => self.secure_vip_address.clone_from(v),
            FieldChange::Ports(v) => self.ports.clone_from(v),
            FieldChange::Status(v) => self.status = *v,
            FieldChange::HomePageUrl(v) => self.home_page_url.clone_from(v),
            FieldChange::StatusPageUrl(v) => self.status_page_url.clone_from(v),
            FieldChange::HealthCheckUrls(v) => self.health_check_urls.clone_from(v),
            FieldChange::Metadata(v) => self.metadata.clone_from(v),
        }
        Ok(())
    }
}

impl Payload for InstanceInfo {
    type Delta = Delta;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn diff_older(&self, older: &Self) -> BTreeSet<Delta> {
        let mut changes = Vec::new();

        if self.app != older.app {
            changes.push(FieldChange::App(self.app.clone()));
        }
        if self.app_group != older.app_group {
            changes.push(FieldChange::AppGroup(self.app_group.clone()));
        }
        if self.asg != older.asg {
            changes.push(FieldChange::Asg(self.asg.clone()));
        }
        if self.vip_address != older.vip_address {
            changes.push(FieldChange::VipAddress(self.vip_address.clone()));
        }
        if self.secure_vip_address != older.secure_vip_address {
            changes.push(FieldChange::SecureVipAddress(self.secure_vip_address.clone()));
        }
        if self.ports != older.ports {
            changes.push(FieldChange::Ports(self.ports.clone()));
        }
        if self.status != older.status {
            changes.push(FieldChange::Status(self.status));
        }
        if self.home_page_url != older.home_page_url {
            changes.push(FieldChange::HomePageUrl(self.home_page_url.clone()));
        }
        if self.status_page_url != older.status_page_url {
            changes.push(FieldChange::StatusPageUrl(self.status_page_url.clone()));
        }
        if self.health_check_urls != older.health_check_urls {
            changes.push(FieldChange::HealthCheckUrls(self.health_check_urls.clone()));
        }
        if self.metadata != older.metadata {
            changes.push(FieldChange::Metadata(self.metadata.clone()));
        }

        changes
            .into_iter()
            .map(|change| Delta {
                id: self.id.clone(),
                change,
            })
            .collect()
    }

    fn summary(&self) -> String {
        format!(
            "{}/{} [{:?}]",
            self.app.as_deref().unwrap_or("-"),
            self.id,
            self.status
        )
    }
}

/// One changed field of an [`InstanceInfo`], addressed to an instance id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Delta {
    /// Instance the delta applies to.
    pub id: String,
    /// The changed field and its new value.
    pub change: FieldChange,
}

/// A changed [`InstanceInfo`] field carrying its new value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    /// New application name.
    App(Option<String>),
    /// New application group.
    AppGroup(Option<String>),
    /// New auto-scaling group.
    Asg(Option<String>),
    /// New virtual address.
    VipAddress(Option<String>),
    /// New secure virtual address.
    SecureVipAddress(Option<String>),
    /// New port set.
    Ports(BTreeSet<u16>),
    /// New status.
    Status(InstanceStatus),
    /// New home page URL.
    HomePageUrl(Option<String>),
    /// New status page URL.
    StatusPageUrl(Option<String>),
    /// New health check URL set.
    HealthCheckUrls(BTreeSet<String>),
    /// New metadata map.
    Metadata(BTreeMap<String, String>),
}

/// Builder for [`InstanceInfo`] values.
///
/// # Examples
///
/// ```
/// use registrar_types::{InstanceInfoBuilder, InstanceStatus};
///
/// let info = InstanceInfoBuilder::new("i-0a1b")
///     .app("billing")
///     .vip_address("billing.internal")
///     .port(8080)
///     .status(InstanceStatus::Up)
///     .build();
///
/// assert_eq!(info.app(), Some("billing"));
/// assert!(info.ports().contains(&8080));
/// ```
#[derive(Debug, Clone)]
pub struct InstanceInfoBuilder {
    info: InstanceInfo,
}

impl InstanceInfoBuilder {
    /// Start building an instance with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            info: InstanceInfo {
                id: id.into(),
                app: None,
                app_group: None,
                asg: None,
                vip_address: None,
                secure_vip_address: None,
                ports: BTreeSet::new(),
                status: InstanceStatus::Unknown,
                home_page_url: None,
                status_page_url: None,
                health_check_urls: BTreeSet::new(),
                metadata: BTreeMap::new(),
            },
        }
    }

    /// Start from a copy of an existing instance.
    pub fn from_instance(info: &InstanceInfo) -> Self {
        Self { info: info.clone() }
    }

    /// Set the application name.
    #[must_use]
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.info.app = Some(app.into());
        self
    }

    /// Set the application group.
    #[must_use]
    pub fn app_group(mut self, group: impl Into<String>) -> Self {
        self.info.app_group = Some(group.into());
        self
    }

    /// Set the auto-scaling group.
    #[must_use]
    pub fn asg(mut self, asg: impl Into<String>) -> Self {
        self.info.asg = Some(asg.into());
        self
    }

    /// Set the virtual address.
    #[must_use]
    pub fn vip_address(mut self, vip: impl Into<String>) -> Self {
        self.info.vip_address = Some(vip.into());
        self
    }

    /// Set the secure virtual address.
    #[must_use]
    pub fn secure_vip_address(mut self, vip: impl Into<String>) -> Self {
        self.info.secure_vip_address = Some(vip.into());
        self
    }

    /// Add a listening port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.info.ports.insert(port);
        self
    }

    /// Set the reported status.
    #[must_use]
    pub const fn status(mut self, status: InstanceStatus) -> Self {
        self.info.status = status;
        self
    }

    /// Set the home page URL.
    #[must_use]
    pub fn home_page_url(mut self, url: impl Into<String>) -> Self {
        self.info.home_page_url = Some(url.into());
        self
    }

    /// Set the status page URL.
    #[must_use]
    pub fn status_page_url(mut self, url: impl Into<String>) -> Self {
        self.info.status_page_url = Some(url.into());
        self
    }

    /// Add a health check URL.
    #[must_use]
    pub fn health_check_url(mut self, url: impl Into<String>) -> Self {
        self.info.health_check_urls.insert(url.into());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.metadata.insert(key.into(), value.into());
        self
    }

    /// Produce the [`InstanceInfo`].
    pub fn build(self) -> InstanceInfo {
        self.info
    }
}
