//! Cluster registry and command-rule access
//!
//! The relational store that owns cluster records and terminal command rules
//! lives outside this service. The core only ever reads it, through the two
//! traits defined here. A YAML-file-backed implementation covers standalone
//! deployments; the in-memory implementation backs tests and embedding.

mod file;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

use crate::Result;

/// Operational status of a registered cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Cluster is serving and should be pooled
    #[default]
    Normal,
    /// Cluster is under maintenance; requests must be refused
    Maintaining,
}

/// A row of the external cluster table
///
/// `name` is the immutable identifier; everything else may change between
/// reconciler passes. The kubeconfig is an opaque blob parsed only at client
/// construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Unique cluster name
    pub name: String,
    /// API server URL
    pub master: String,
    /// Raw kubeconfig contents
    #[serde(rename = "kubeConfig")]
    pub kubeconfig: String,
    /// Operational status
    #[serde(default)]
    pub status: ClusterStatus,
    /// Soft-delete marker; deleted records never reach the pool
    #[serde(default)]
    pub deleted: bool,
}

impl ClusterRecord {
    /// Structural fingerprint over the fields whose change requires the
    /// cluster manager to be rebuilt
    pub fn fingerprint(&self) -> String {
        let digest = md5::compute(format!(
            "{}\n{:?}\n{}",
            self.master, self.status, self.kubeconfig
        ));
        format!("{digest:x}")
    }
}

/// Whether a command rule forbids or exclusively permits its commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Matching commands are denied
    #[default]
    Blacklist,
    /// Only matching commands are allowed
    Whitelist,
}

/// A terminal command rule scoped to a role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRule {
    /// Role the rule applies to ("admin", "user", ...)
    pub role: String,
    /// Blacklist or whitelist
    #[serde(rename = "ruleType", default)]
    pub rule_type: RuleType,
    /// Comma-separated list of command names matched by first-word equality
    pub command: String,
    /// Human-readable reason shown when the rule denies a command
    #[serde(default)]
    pub description: String,
    /// Disabled rules are never loaded
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// An authenticated platform user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub name: String,
    /// Platform administrator flag; maps to the "admin" rule role
    #[serde(default)]
    pub admin: bool,
}

/// Read-only view of the external cluster table
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// List every non-deleted cluster record with status normal
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>>;
}

/// Read-only view of the terminal command rule table
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRuleStore: Send + Sync {
    /// Enabled rules for the given role
    async fn enabled_rules_for_role(&self, role: &str) -> Result<Vec<CommandRule>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(master: &str, status: ClusterStatus, kubeconfig: &str) -> ClusterRecord {
        ClusterRecord {
            name: "prod".into(),
            master: master.into(),
            kubeconfig: kubeconfig.into(),
            status,
            deleted: false,
        }
    }

    /// The fingerprint must move whenever any of master, status, or the
    /// kubeconfig blob moves, and must be stable otherwise. Replacement of a
    /// live manager hangs off this equality.
    #[test]
    fn fingerprint_tracks_rebuild_relevant_fields() {
        let base = record("https://10.0.0.1:6443", ClusterStatus::Normal, "kc-v1");

        assert_eq!(
            base.fingerprint(),
            record("https://10.0.0.1:6443", ClusterStatus::Normal, "kc-v1").fingerprint()
        );

        assert_ne!(
            base.fingerprint(),
            record("https://10.0.0.2:6443", ClusterStatus::Normal, "kc-v1").fingerprint()
        );
        assert_ne!(
            base.fingerprint(),
            record("https://10.0.0.1:6443", ClusterStatus::Maintaining, "kc-v1").fingerprint()
        );
        assert_ne!(
            base.fingerprint(),
            record("https://10.0.0.1:6443", ClusterStatus::Normal, "kc-v2").fingerprint()
        );
    }

    /// Field boundaries feed the digest; moving bytes between fields must
    /// not collide.
    #[test]
    fn fingerprint_separates_fields() {
        let a = record("https://m", ClusterStatus::Normal, "xkc");
        let b = record("https://mx", ClusterStatus::Normal, "kc");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
