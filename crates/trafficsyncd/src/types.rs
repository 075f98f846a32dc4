//! Tracked resource types.
//!
//! A resource is a declarative request stored by the external resource
//! framework: metadata, a user-owned spec and a controller-owned status.
//! Two kinds exist:
//!
//! - traffic sync requests feed per-workload accounts from a node agent
//! - port feed requests derive per-feed totals from those accounts

use crate::cursor::SyncStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use traffic_accounting::{AccountingError, Tag};

/// Namespaced identity of a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName {
    pub namespace: String,
    pub name: String,
}

impl ResourceName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Framework-owned metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Markers that block removal until cleared.
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set once removal has been requested.
    #[serde(default)]
    pub deletion_requested: bool,
    /// Bumped on every spec change.
    #[serde(default)]
    pub generation: i64,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the resource identity.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns true if `finalizer` is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

/// A tracked resource with spec `S`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource<S> {
    pub meta: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: SyncStatus,
}

impl<S> Resource<S> {
    pub fn new(meta: ObjectMeta, spec: S) -> Self {
        Self {
            meta,
            spec,
            status: SyncStatus::default(),
        }
    }

    /// Returns the resource identity.
    pub fn name(&self) -> ResourceName {
        self.meta.resource_name()
    }
}

/// Joins a workload's namespace and pod into the account/feed key.
pub fn workload_key(namespace: &str, pod: &str) -> String {
    format!("{}/{}", namespace, pod)
}

/// Request to sample one endpoint's counters into its workload account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSyncRequestSpec {
    pub associated_namespace: String,
    pub associated_pod: String,
    /// Node whose agent holds the counters.
    pub node_ip: String,
    /// Endpoint address.
    pub address: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub sync_period: Duration,
}

impl TrafficSyncRequestSpec {
    /// Account key of the owning workload.
    pub fn owner_key(&self) -> String {
        workload_key(&self.associated_namespace, &self.associated_pod)
    }

    /// Validated tags, in declaration order.
    pub fn tags(&self) -> Result<Vec<Tag>, AccountingError> {
        self.tags.iter().map(|t| Tag::new(t.as_str())).collect()
    }
}

/// Request to roll a workload's account totals for one port into its feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortFeedRequestSpec {
    pub associated_namespace: String,
    pub associated_pod: String,
    /// Restricts the feed to one endpoint; all endpoints when absent.
    #[serde(default)]
    pub address: Option<String>,
    pub port: u16,
    pub sync_period: Duration,
}

impl PortFeedRequestSpec {
    /// Account key the feed reads from.
    pub fn owner_key(&self) -> String {
        workload_key(&self.associated_namespace, &self.associated_pod)
    }

    /// Feed key written to. Same identity as the account, separate collection.
    pub fn feed_key(&self) -> String {
        self.owner_key()
    }

    /// The port as an account tag.
    pub fn tag(&self) -> Result<Tag, AccountingError> {
        Tag::new(self.port.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_display() {
        assert_eq!(ResourceName::new("team-a", "tsr-1").to_string(), "team-a/tsr-1");
    }

    #[test]
    fn test_traffic_sync_spec_keys() {
        let spec = TrafficSyncRequestSpec {
            associated_namespace: "team-a".into(),
            associated_pod: "web-0".into(),
            node_ip: "192.168.0.10".into(),
            address: "10.0.0.1".into(),
            tags: vec!["80".into(), "443".into()],
            sync_period: Duration::from_secs(60),
        };
        assert_eq!(spec.owner_key(), "team-a/web-0");
        let tags = spec.tags().unwrap();
        assert_eq!(tags, vec![Tag::new("80").unwrap(), Tag::new("443").unwrap()]);
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let spec = TrafficSyncRequestSpec {
            associated_namespace: "ns".into(),
            associated_pod: "pod".into(),
            node_ip: "n".into(),
            address: "10.0.0.1".into(),
            tags: vec!["80".into(), "a.b".into()],
            sync_period: Duration::from_secs(60),
        };
        assert!(matches!(spec.tags(), Err(AccountingError::InvalidTag { .. })));
    }

    #[test]
    fn test_port_feed_spec_keys() {
        let spec = PortFeedRequestSpec {
            associated_namespace: "team-a".into(),
            associated_pod: "web-0".into(),
            address: None,
            port: 8080,
            sync_period: Duration::from_secs(30),
        };
        assert_eq!(spec.owner_key(), "team-a/web-0");
        assert_eq!(spec.feed_key(), "team-a/web-0");
        assert_eq!(spec.tag().unwrap().as_str(), "8080");
    }

    #[test]
    fn test_meta_finalizers() {
        let mut meta = ObjectMeta::new("ns", "r");
        assert!(!meta.has_finalizer("x/y"));
        meta.finalizers.push("x/y".into());
        assert!(meta.has_finalizer("x/y"));
        assert_eq!(meta.resource_name(), ResourceName::new("ns", "r"));
    }
}
