//! Uniform CRUD surface over one cluster
//!
//! Reads go through the informer cache when the kind is informed and the
//! cache has completed its initial list; everything else goes to the API
//! server through a dynamic client built from the resource map entry.
//! Informer-cached objects come back without their TypeMeta (list items
//! drop apiVersion/kind on the wire), so the facade restores it from the
//! map entry before returning.
//!
//! Kind-based operations resolve the plural name through the per-cluster
//! map; the `_with` variants accept an explicit entry and serve the CRD
//! instance routes, whose coordinates come from the definition itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams, PropagationPolicy};
use kube::core::TypeMeta;
use kube::runtime::reflector::ObjectRef;
use serde::Deserialize;
use tracing::debug;

use crate::cluster::ClusterManager;
use crate::error::Error;
use crate::resource::{ResourceMap, ResourceMapEntry};
use crate::Result;

/// Caller-supplied delete options, a subset of the upstream DeleteOptions
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    /// Seconds the object is given to terminate gracefully
    pub grace_period_seconds: Option<u32>,
    /// Dependent-deletion policy: Orphan, Background, or Foreground
    pub propagation_policy: Option<String>,
}

impl DeleteOptions {
    fn into_params(self) -> Result<DeleteParams> {
        let propagation_policy = match self.propagation_policy.as_deref() {
            None => None,
            Some("Orphan") => Some(PropagationPolicy::Orphan),
            Some("Background") => Some(PropagationPolicy::Background),
            Some("Foreground") => Some(PropagationPolicy::Foreground),
            Some(other) => {
                return Err(Error::validation(format!(
                    "unknown propagation policy: {other}"
                )))
            }
        };
        Ok(DeleteParams {
            grace_period_seconds: self.grace_period_seconds,
            propagation_policy,
            ..DeleteParams::default()
        })
    }
}

/// Per-request resource access over one pooled cluster
pub struct Facade {
    manager: Arc<ClusterManager>,
}

impl Facade {
    /// Wrap a manager snapshot for the duration of one request
    pub fn new(manager: Arc<ClusterManager>) -> Self {
        Self { manager }
    }

    /// The manager's resource map
    pub fn resource_map(&self) -> Arc<ResourceMap> {
        self.manager.resource_map()
    }

    /// The manager's client, for operations outside the map
    pub fn client(&self) -> kube::Client {
        self.manager.client()
    }

    /// Resolve a plural kind name or fail with KindUnsupported
    pub fn entry(&self, kind: &str) -> Result<ResourceMapEntry> {
        self.manager
            .resource_map()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::KindUnsupported(kind.to_string()))
    }

    fn api(&self, entry: &ResourceMapEntry, namespace: &str) -> Api<DynamicObject> {
        let ar = entry.api_resource();
        if entry.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.manager.client(), namespace, &ar)
        } else {
            Api::all_with(self.manager.client(), &ar)
        }
    }

    fn require_namespace(entry: &ResourceMapEntry, namespace: &str) -> Result<()> {
        if entry.namespaced && namespace.is_empty() {
            return Err(Error::NamespaceRequired(entry.resource.clone()));
        }
        Ok(())
    }

    fn restore_type_meta(entry: &ResourceMapEntry, mut obj: DynamicObject) -> DynamicObject {
        obj.types = Some(TypeMeta {
            api_version: entry.api_resource().api_version,
            kind: entry.kind.clone(),
        });
        obj
    }

    /// Fetch one object by kind, namespace, and name
    pub async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<DynamicObject> {
        let entry = self.entry(kind)?;
        self.get_with(&entry, namespace, name).await
    }

    /// Fetch one object using explicit coordinates
    pub async fn get_with(
        &self,
        entry: &ResourceMapEntry,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject> {
        if name.is_empty() {
            return Err(Error::validation("name cannot be empty"));
        }
        Self::require_namespace(entry, namespace)?;

        if let Some(store) = self.manager.store(&entry.resource) {
            if self.manager.cache_ready() {
                let mut obj_ref = ObjectRef::new_with(name, entry.api_resource());
                if entry.namespaced {
                    obj_ref = obj_ref.within(namespace);
                }
                let obj = store
                    .get(&obj_ref)
                    .map(|o| (*o).clone())
                    .ok_or_else(|| Error::NotFound(format!("{}/{name}", entry.resource)))?;
                return Ok(Self::restore_type_meta(entry, obj));
            }
        }

        let obj = self.api(entry, namespace).get(name).await?;
        Ok(Self::restore_type_meta(entry, obj))
    }

    /// List objects of a kind, optionally narrowed by namespace and label
    /// selector; cluster-scoped kinds ignore the namespace
    pub async fn list(
        &self,
        kind: &str,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let entry = self.entry(kind)?;
        self.list_with(&entry, namespace, label_selector).await
    }

    /// List objects using explicit coordinates
    pub async fn list_with(
        &self,
        entry: &ResourceMapEntry,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        if let Some(store) = self.manager.store(&entry.resource) {
            if self.manager.cache_ready() {
                let objs = store
                    .state()
                    .into_iter()
                    .map(|o| (*o).clone())
                    .filter(|o| {
                        !entry.namespaced
                            || namespace.is_empty()
                            || o.metadata.namespace.as_deref() == Some(namespace)
                    })
                    .filter(|o| selector_matches(label_selector, o.metadata.labels.as_ref()))
                    .map(|o| Self::restore_type_meta(entry, o))
                    .collect();
                return Ok(objs);
            }
        }

        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        let listed = self.api(entry, namespace).list(&params).await?;
        Ok(listed
            .items
            .into_iter()
            .map(|o| Self::restore_type_meta(entry, o))
            .collect())
    }

    /// Create an object from its JSON body
    pub async fn create(
        &self,
        kind: &str,
        namespace: &str,
        body: serde_json::Value,
    ) -> Result<DynamicObject> {
        let entry = self.entry(kind)?;
        self.create_with(&entry, namespace, body).await
    }

    /// Create an object using explicit coordinates
    pub async fn create_with(
        &self,
        entry: &ResourceMapEntry,
        namespace: &str,
        body: serde_json::Value,
    ) -> Result<DynamicObject> {
        Self::require_namespace(entry, namespace)?;

        let obj: DynamicObject = serde_json::from_value(body)
            .map_err(|e| Error::validation(format!("invalid {} body: {e}", entry.resource)))?;
        let created = self
            .api(entry, namespace)
            .create(&PostParams::default(), &obj)
            .await?;
        Ok(Self::restore_type_meta(entry, created))
    }

    /// Replace an object, carrying the live resourceVersion forward when the
    /// caller omitted it so the server can still detect conflicts
    pub async fn update(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<DynamicObject> {
        let entry = self.entry(kind)?;
        self.update_with(&entry, namespace, name, body).await
    }

    /// Replace an object using explicit coordinates
    pub async fn update_with(
        &self,
        entry: &ResourceMapEntry,
        namespace: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<DynamicObject> {
        Self::require_namespace(entry, namespace)?;

        let mut obj: DynamicObject = serde_json::from_value(body)
            .map_err(|e| Error::validation(format!("invalid {} body: {e}", entry.resource)))?;

        let api = self.api(entry, namespace);
        if obj
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or("")
            .is_empty()
        {
            let current = api.get(name).await?;
            debug!(kind = %entry.resource, name = %name, "carrying resourceVersion forward");
            obj.metadata.resource_version = current.metadata.resource_version;
        }

        let updated = api.replace(name, &PostParams::default(), &obj).await?;
        Ok(Self::restore_type_meta(entry, updated))
    }

    /// Delete an object
    pub async fn delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
    ) -> Result<()> {
        let entry = self.entry(kind)?;
        self.delete_with(&entry, namespace, name, options).await
    }

    /// Delete an object using explicit coordinates
    pub async fn delete_with(
        &self,
        entry: &ResourceMapEntry,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
    ) -> Result<()> {
        Self::require_namespace(entry, namespace)?;

        self.api(entry, namespace)
            .delete(name, &options.into_params()?)
            .await?;
        Ok(())
    }
}

/// Equality-subset label selector match against cached objects
///
/// Supports `k=v`, `k==v`, `k!=v`, and bare-key existence terms joined by
/// commas. The live list path passes the full selector through to the API
/// server instead.
fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    let selector = selector.trim();
    if selector.is_empty() {
        return true;
    }
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);

    selector.split(',').all(|term| {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        if let Some((k, v)) = term.split_once("!=") {
            return labels.get(k.trim()).map(String::as_str) != Some(v.trim());
        }
        if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
            return labels.get(k.trim()).map(String::as_str) == Some(v.trim());
        }
        labels.contains_key(term)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_equality_and_negation() {
        let l = labels(&[("app", "web"), ("tier", "front")]);
        assert!(selector_matches("app=web", Some(&l)));
        assert!(selector_matches("app==web,tier=front", Some(&l)));
        assert!(selector_matches("app!=api", Some(&l)));
        assert!(!selector_matches("app=api", Some(&l)));
        assert!(!selector_matches("app=web,tier=back", Some(&l)));
    }

    #[test]
    fn selector_existence_and_empty() {
        let l = labels(&[("app", "web")]);
        assert!(selector_matches("", Some(&l)));
        assert!(selector_matches("app", Some(&l)));
        assert!(!selector_matches("tier", Some(&l)));
        assert!(selector_matches("", None));
        assert!(!selector_matches("app=web", None));
    }

    #[test]
    fn unknown_propagation_policy_is_rejected() {
        let opts = DeleteOptions {
            grace_period_seconds: Some(5),
            propagation_policy: Some("Sideways".into()),
        };
        assert!(opts.into_params().is_err());

        let opts = DeleteOptions {
            grace_period_seconds: None,
            propagation_policy: Some("Foreground".into()),
        };
        assert!(opts.into_params().is_ok());
    }

    mod cache_reads {
        use super::super::*;
        use crate::cluster::ClusterManager;
        use crate::registry::{ClusterRecord, ClusterStatus};
        use crate::resource::ResourceMap;

        fn offline_manager(map: ResourceMap) -> Arc<ClusterManager> {
            let config = kube::Config::new("http://127.0.0.1:1".parse().expect("uri"));
            let client = kube::Client::try_from(config).expect("client");
            ClusterManager::with_client(
                client,
                ClusterRecord {
                    name: "test".into(),
                    master: "http://127.0.0.1:1".into(),
                    kubeconfig: String::new(),
                    status: ClusterStatus::Normal,
                    deleted: false,
                },
                map,
            )
        }

        #[tokio::test]
        async fn unknown_kind_is_rejected_before_any_network_io() {
            let facade = Facade::new(offline_manager(ResourceMap::default()));
            assert!(matches!(
                facade.get("wombats", "default", "w1").await,
                Err(Error::KindUnsupported(_))
            ));
        }

        /// Watch list items arrive without apiVersion/kind; whatever comes
        /// off the cache must leave the facade with both restored.
        #[test]
        fn type_meta_is_restored_from_the_map_entry() {
            let entry = ResourceMapEntry {
                group: "apps".into(),
                version: "v1".into(),
                resource: "deployments".into(),
                kind: "Deployment".into(),
                namespaced: true,
            };
            let stripped =
                kube::api::DynamicObject::new("web", &entry.api_resource()).within("prod");
            let mut stripped = stripped;
            stripped.types = None;

            let restored = Facade::restore_type_meta(&entry, stripped);
            let types = restored.types.expect("types restored");
            assert_eq!(types.api_version, "apps/v1");
            assert_eq!(types.kind, "Deployment");
        }

        #[tokio::test]
        async fn namespaced_kind_requires_a_namespace() {
            let map = ResourceMap::from_entries(vec![ResourceMapEntry {
                group: String::new(),
                version: "v1".into(),
                resource: "pods".into(),
                kind: "Pod".into(),
                namespaced: true,
            }]);
            let facade = Facade::new(offline_manager(map));
            assert!(matches!(
                facade.get("pods", "", "web-0").await,
                Err(Error::NamespaceRequired(_))
            ));
            assert!(matches!(
                facade
                    .delete("pods", "", "web-0", DeleteOptions::default())
                    .await,
                Err(Error::NamespaceRequired(_))
            ));
        }
    }
}
