//! YAML-file-backed registry
//!
//! The file is re-read on every call so that edits land within one
//! reconciler period, matching the behavior of a polled database table.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{ClusterRecord, ClusterRegistry, ClusterStatus, CommandRule, CommandRuleStore};
use crate::error::Error;
use crate::Result;

/// On-disk registry document
#[derive(Debug, Default, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    clusters: Vec<ClusterRecord>,
    #[serde(default, rename = "commandRules")]
    command_rules: Vec<CommandRule>,
}

/// Registry backed by a single YAML file
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    /// Create a registry reading from the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<RegistryDocument> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::registry(format!("read {}: {e}", self.path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::registry(format!("parse {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ClusterRegistry for FileRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        let doc = self.load().await?;
        Ok(doc
            .clusters
            .into_iter()
            .filter(|c| !c.deleted && c.status == ClusterStatus::Normal)
            .collect())
    }
}

#[async_trait]
impl CommandRuleStore for FileRegistry {
    async fn enabled_rules_for_role(&self, role: &str) -> Result<Vec<CommandRule>> {
        let doc = self.load().await.map_err(|e| {
            warn!(error = %e, "failed to load command rules");
            e
        })?;
        Ok(doc
            .command_rules
            .into_iter()
            .filter(|r| r.enabled && r.role == role)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuleType;
    use std::io::Write;

    fn write_doc(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(content.as_bytes()).expect("write");
        f
    }

    #[tokio::test]
    async fn lists_only_live_normal_clusters() {
        let f = write_doc(
            r#"
clusters:
  - name: alpha
    master: https://alpha:6443
    kubeConfig: "kc-a"
  - name: beta
    master: https://beta:6443
    kubeConfig: "kc-b"
    status: maintaining
  - name: gamma
    master: https://gamma:6443
    kubeConfig: "kc-g"
    deleted: true
"#,
        );
        let reg = FileRegistry::new(f.path());
        let clusters = reg.list_clusters().await.expect("list");
        let names: Vec<_> = clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[tokio::test]
    async fn filters_rules_by_role_and_enabled() {
        let f = write_doc(
            r#"
commandRules:
  - role: user
    ruleType: blacklist
    command: "rm,shutdown"
    description: destructive commands
  - role: user
    ruleType: whitelist
    command: "ls"
    enabled: false
  - role: admin
    ruleType: blacklist
    command: "reboot"
"#,
        );
        let reg = FileRegistry::new(f.path());
        let rules = reg.enabled_rules_for_role("user").await.expect("rules");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::Blacklist);
        assert_eq!(rules[0].command, "rm,shutdown");
    }

    #[tokio::test]
    async fn missing_file_is_a_registry_error() {
        let reg = FileRegistry::new("/nonexistent/clusters.yaml");
        assert!(reg.list_clusters().await.is_err());
    }
}
