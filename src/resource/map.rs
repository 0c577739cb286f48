//! Per-cluster resource map
//!
//! Maps a plural kind name ("deployments") to the coordinates needed to
//! build a dynamic API client for it. Only the native Kubernetes API groups
//! populate the map; unknown groups are filtered out to keep the informer
//! footprint bounded. The map is immutable for the lifetime of its cluster
//! manager, so CRDs installed at runtime become visible only after the
//! manager is replaced by a reconciler pass.

use std::collections::HashMap;

use kube::discovery::{ApiResource, Discovery, Scope};
use kube::Client;
use serde::Serialize;
use tracing::debug;

use crate::Result;

/// The closed set of API groups admitted into the resource map
pub const NATIVE_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "extensions",
    "policy",
    "autoscaling",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
];

/// Plural names of the kinds backed by an informer cache
///
/// Everything else still participates in CRUD but is fetched live.
pub const CACHEABLE_KINDS: &[&str] = &[
    "pods",
    "events",
    "deployments",
    "nodes",
    "endpoints",
    "horizontalpodautoscalers",
];

/// One resolved kind in the resource map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMapEntry {
    /// API group, empty for the core group
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Plural resource name
    pub resource: String,
    /// CamelCase kind
    pub kind: String,
    /// Whether instances live inside a namespace
    pub namespaced: bool,
}

impl ResourceMapEntry {
    /// Build the dynamic-client coordinates for this entry
    pub fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version,
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }

    /// Whether this kind is served from an informer cache
    pub fn cacheable(&self) -> bool {
        CACHEABLE_KINDS.contains(&self.resource.as_str())
    }
}

/// Immutable map from plural kind name to its coordinates
#[derive(Debug, Default, Clone)]
pub struct ResourceMap {
    entries: HashMap<String, ResourceMapEntry>,
}

impl ResourceMap {
    /// Look up a kind by its plural name
    pub fn get(&self, kind: &str) -> Option<&ResourceMapEntry> {
        self.entries.get(kind)
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = &ResourceMapEntry> {
        self.entries.values()
    }

    /// Entries that should be registered with the informer set
    pub fn cacheable_entries(&self) -> impl Iterator<Item = &ResourceMapEntry> {
        self.entries.values().filter(|e| e.cacheable())
    }

    /// Number of mapped kinds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enumerate the server's preferred resources and keep the native groups
    ///
    /// Per-group discovery failures are tolerated by the discovery run; only
    /// a wholesale failure to reach the API server surfaces as an error.
    pub async fn discover(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client).filter(NATIVE_GROUPS).run().await?;

        let mut entries = HashMap::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                // Subresources ("pods/log") never route through the map
                if ar.plural.contains('/') {
                    continue;
                }
                entries.insert(
                    ar.plural.clone(),
                    ResourceMapEntry {
                        group: ar.group.clone(),
                        version: ar.version.clone(),
                        resource: ar.plural.clone(),
                        kind: ar.kind.clone(),
                        namespaced: matches!(caps.scope, Scope::Namespaced),
                    },
                );
            }
        }

        debug!(kinds = entries.len(), "resource map discovered");
        Ok(Self { entries })
    }

    /// Build a map from explicit entries, for tests and fixtures
    pub fn from_entries(list: Vec<ResourceMapEntry>) -> Self {
        Self {
            entries: list
                .into_iter()
                .map(|e| (e.resource.clone(), e))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn pods_entry() -> ResourceMapEntry {
        ResourceMapEntry {
            group: String::new(),
            version: "v1".into(),
            resource: "pods".into(),
            kind: "Pod".into(),
            namespaced: true,
        }
    }

    #[test]
    fn core_group_api_version_has_no_slash() {
        let ar = pods_entry().api_resource();
        assert_eq!(ar.api_version, "v1");
        assert_eq!(ar.plural, "pods");
    }

    #[test]
    fn grouped_api_version_joins_group_and_version() {
        let entry = ResourceMapEntry {
            group: "apps".into(),
            version: "v1".into(),
            resource: "deployments".into(),
            kind: "Deployment".into(),
            namespaced: true,
        };
        assert_eq!(entry.api_resource().api_version, "apps/v1");
    }

    #[test]
    fn only_the_informed_set_is_cacheable() {
        assert!(pods_entry().cacheable());

        let secrets = ResourceMapEntry {
            group: String::new(),
            version: "v1".into(),
            resource: "secrets".into(),
            kind: "Secret".into(),
            namespaced: true,
        };
        assert!(!secrets.cacheable());
    }

    #[test]
    fn map_indexes_by_plural_name() {
        let map = ResourceMap::from_entries(vec![pods_entry()]);
        assert_eq!(map.get("pods").map(|e| e.kind.as_str()), Some("Pod"));
        assert!(map.get("Pod").is_none());
    }
}
