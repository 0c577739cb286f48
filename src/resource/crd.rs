//! Custom resource definition handling
//!
//! CRD instance routes arrive keyed by `(group, version, plural)`. The
//! version segment may be absent or the literal string `"undefined"` when a
//! frontend does not know it; in that case the served version is resolved
//! from the definition itself.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionVersion,
};
use kube::api::Api;
use kube::Client;

use crate::error::Error;
use crate::resource::ResourceMapEntry;
use crate::Result;

/// Version placeholder sent by clients that do not know the served version
pub const VERSION_UNDEFINED: &str = "undefined";

/// Pick the version clients should talk to:
/// the storage version, else the first served version, else the
/// lexicographically largest name
pub fn best_served_version(
    versions: &[CustomResourceDefinitionVersion],
) -> Option<&CustomResourceDefinitionVersion> {
    if let Some(v) = versions.iter().find(|v| v.storage) {
        return Some(v);
    }
    if let Some(v) = versions.iter().find(|v| v.served) {
        return Some(v);
    }
    versions.iter().max_by(|a, b| a.name.cmp(&b.name))
}

/// Resolve a CRD instance route into a resource map entry
///
/// `version` may be empty or [`VERSION_UNDEFINED`]; the definition named
/// `{plural}.{group}` supplies the rest.
pub async fn resolve_crd_entry(
    client: Client,
    group: &str,
    version: &str,
    plural: &str,
) -> Result<ResourceMapEntry> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd_name = format!("{plural}.{group}");
    let crd = crds
        .get(&crd_name)
        .await
        .map_err(|e| Error::KindUnsupported(format!("{crd_name}: {e}")))?;

    let version = if version.is_empty() || version == VERSION_UNDEFINED {
        best_served_version(&crd.spec.versions)
            .map(|v| v.name.clone())
            .ok_or_else(|| Error::KindUnsupported(format!("{crd_name}: no versions")))?
    } else {
        version.to_string()
    };

    Ok(ResourceMapEntry {
        group: crd.spec.group.clone(),
        version,
        resource: crd.spec.names.plural.clone(),
        kind: crd.spec.names.kind.clone(),
        namespaced: crd.spec.scope == "Namespaced",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str, served: bool, storage: bool) -> CustomResourceDefinitionVersion {
        CustomResourceDefinitionVersion {
            name: name.to_string(),
            served,
            storage,
            ..Default::default()
        }
    }

    #[test]
    fn storage_version_wins() {
        let versions = vec![
            version("v1alpha1", true, false),
            version("v1beta1", true, true),
            version("v1", true, false),
        ];
        assert_eq!(best_served_version(&versions).map(|v| v.name.as_str()), Some("v1beta1"));
    }

    #[test]
    fn first_served_version_is_the_fallback() {
        let versions = vec![
            version("v1alpha1", false, false),
            version("v1beta1", true, false),
            version("v1", true, false),
        ];
        assert_eq!(best_served_version(&versions).map(|v| v.name.as_str()), Some("v1beta1"));
    }

    #[test]
    fn largest_name_when_nothing_is_served() {
        let versions = vec![
            version("v1alpha1", false, false),
            version("v1beta2", false, false),
            version("v1beta1", false, false),
        ];
        assert_eq!(best_served_version(&versions).map(|v| v.name.as_str()), Some("v1beta2"));
    }

    #[test]
    fn empty_version_list_yields_none() {
        assert!(best_served_version(&[]).is_none());
    }
}
