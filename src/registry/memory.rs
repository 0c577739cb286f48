//! In-memory registry for tests and embedding

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ClusterRecord, ClusterRegistry, ClusterStatus, CommandRule, CommandRuleStore};
use crate::Result;

/// Mutable in-memory registry
///
/// Mutations take effect on the next reconciler pass, exactly like edits to
/// the external table would.
#[derive(Default)]
pub struct MemoryRegistry {
    clusters: RwLock<Vec<ClusterRecord>>,
    rules: RwLock<Vec<CommandRule>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cluster record by name
    pub fn upsert_cluster(&self, record: ClusterRecord) {
        let mut clusters = self.clusters.write();
        if let Some(existing) = clusters.iter_mut().find(|c| c.name == record.name) {
            *existing = record;
        } else {
            clusters.push(record);
        }
    }

    /// Soft-delete a cluster record
    pub fn mark_deleted(&self, name: &str) {
        if let Some(c) = self.clusters.write().iter_mut().find(|c| c.name == name) {
            c.deleted = true;
        }
    }

    /// Replace the rule set
    pub fn set_rules(&self, rules: Vec<CommandRule>) {
        *self.rules.write() = rules;
    }
}

#[async_trait]
impl ClusterRegistry for MemoryRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self
            .clusters
            .read()
            .iter()
            .filter(|c| !c.deleted && c.status == ClusterStatus::Normal)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommandRuleStore for MemoryRegistry {
    async fn enabled_rules_for_role(&self, role: &str) -> Result<Vec<CommandRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.enabled && r.role == role)
            .cloned()
            .collect())
    }
}
