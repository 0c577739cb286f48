//! Process-wide pool of cluster managers
//!
//! The pool map is concurrent: any task may read, only reconcile passes
//! mutate. One pass is a single logical transaction - removals first, then
//! parallel construction of new and replacement managers, then atomic swaps.
//! A replaced manager is closed only after its successor is visible.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use super::ClusterManager;
use crate::error::Error;
use crate::registry::{ClusterRecord, ClusterRegistry, ClusterStatus};
use crate::Result;

/// Builds a manager from a record; swapped out in tests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagerFactory: Send + Sync {
    /// Construct a fully wired manager for the record
    async fn build(&self, record: &ClusterRecord) -> Result<Arc<ClusterManager>>;
}

/// Production factory connecting through the record's kubeconfig
pub struct ConnectFactory;

#[async_trait]
impl ManagerFactory for ConnectFactory {
    async fn build(&self, record: &ClusterRecord) -> Result<Arc<ClusterManager>> {
        ClusterManager::connect(record).await
    }
}

/// The cluster manager pool
pub struct ClusterPool {
    managers: DashMap<String, Arc<ClusterManager>>,
    registry: Arc<dyn ClusterRegistry>,
    factory: Arc<dyn ManagerFactory>,
    // Passes never overlap; a miss-triggered pass queues behind the periodic one
    pass_lock: Mutex<()>,
}

impl ClusterPool {
    /// Create a pool that connects real clients
    pub fn new(registry: Arc<dyn ClusterRegistry>) -> Arc<Self> {
        Self::with_factory(registry, Arc::new(ConnectFactory))
    }

    /// Create a pool with a custom manager factory
    pub fn with_factory(
        registry: Arc<dyn ClusterRegistry>,
        factory: Arc<dyn ManagerFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            managers: DashMap::new(),
            registry,
            factory,
            pass_lock: Mutex::new(()),
        })
    }

    /// Look up the manager for a cluster name
    ///
    /// A miss triggers one synchronous reconcile pass before giving up. A
    /// manager whose record snapshot says maintaining is refused even while
    /// still present; the next pass removes it.
    pub async fn manager(&self, name: &str) -> Result<Arc<ClusterManager>> {
        if self.managers.get(name).is_none() {
            if let Err(e) = self.reconcile_once().await {
                warn!(cluster = %name, error = %e, "refresh pass failed during lookup");
            }
        }

        let manager = self
            .managers
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::ClusterNotFound(name.to_string()))?;

        if manager.record().status == ClusterStatus::Maintaining {
            return Err(Error::ClusterMaintaining(name.to_string()));
        }
        Ok(manager)
    }

    /// Snapshot of the active pool for fan-out operations
    pub fn managers(&self) -> Vec<(String, Arc<ClusterManager>)> {
        self.managers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Whether a cluster is currently pooled
    pub fn contains(&self, name: &str) -> bool {
        self.managers.contains_key(name)
    }

    /// Number of pooled clusters
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Run one reconcile pass: diff the registry against the pool
    pub async fn reconcile_once(&self) -> Result<()> {
        let _pass = self.pass_lock.lock().await;

        let records = self.registry.list_clusters().await?;
        let desired: HashMap<&str, &ClusterRecord> =
            records.iter().map(|r| (r.name.as_str(), r)).collect();

        // Remove managers whose record is gone, deleted, or no longer normal
        let stale: Vec<String> = self
            .managers
            .iter()
            .filter(|e| !desired.contains_key(e.key().as_str()))
            .map(|e| e.key().clone())
            .collect();
        for name in stale {
            if let Some((_, old)) = self.managers.remove(&name) {
                old.close();
                info!(cluster = %name, "cluster removed from pool");
            }
        }

        // Build new and replacement managers in parallel
        let mut builds = Vec::new();
        for record in &records {
            let unchanged = self
                .managers
                .get(record.name.as_str())
                .map(|m| m.fingerprint() == record.fingerprint())
                .unwrap_or(false);
            if unchanged {
                continue;
            }
            let factory = self.factory.clone();
            let record = record.clone();
            builds.push(async move {
                let built = factory.build(&record).await;
                (record.name, built)
            });
        }

        for (name, built) in futures::future::join_all(builds).await {
            match built {
                Ok(manager) => {
                    // Publish first, then close the replaced manager
                    if let Some(old) = self.managers.insert(name.clone(), manager) {
                        old.close();
                        info!(cluster = %name, "cluster manager replaced");
                    } else {
                        info!(cluster = %name, "cluster added to pool");
                    }
                }
                Err(e) => {
                    // The cluster stays absent until a later pass succeeds
                    warn!(cluster = %name, error = %e, "cluster manager construction failed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::resource::ResourceMap;

    fn offline_client() -> kube::Client {
        let config = kube::Config::new("http://127.0.0.1:1".parse().expect("uri"));
        kube::Client::try_from(config).expect("client")
    }

    struct OfflineFactory;

    #[async_trait]
    impl ManagerFactory for OfflineFactory {
        async fn build(&self, record: &ClusterRecord) -> Result<Arc<ClusterManager>> {
            Ok(ClusterManager::with_client(
                offline_client(),
                record.clone(),
                ResourceMap::default(),
            ))
        }
    }

    fn record(name: &str, kubeconfig: &str) -> ClusterRecord {
        ClusterRecord {
            name: name.into(),
            master: format!("https://{name}:6443"),
            kubeconfig: kubeconfig.into(),
            status: ClusterStatus::Normal,
            deleted: false,
        }
    }

    fn pool_over(registry: Arc<MemoryRegistry>) -> Arc<ClusterPool> {
        ClusterPool::with_factory(registry, Arc::new(OfflineFactory))
    }

    // =========================================================================
    // Pool Consistency Stories
    // =========================================================================

    /// Story: a cluster inserted into the registry appears in the pool
    /// within one pass; a deleted cluster disappears and its informer stop
    /// signal fires.
    #[tokio::test]
    async fn story_add_then_remove_cluster() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(record("alpha", "kc-a"));
        let pool = pool_over(registry.clone());

        pool.reconcile_once().await.expect("pass");
        assert_eq!(pool.len(), 1);
        assert!(pool.manager("alpha").await.is_ok());

        registry.upsert_cluster(record("beta", "kc-b"));
        pool.reconcile_once().await.expect("pass");
        let mut names: Vec<_> = pool.managers().into_iter().map(|(n, _)| n).collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);

        let alpha = pool.manager("alpha").await.expect("alpha");
        registry.mark_deleted("alpha");
        pool.reconcile_once().await.expect("pass");

        assert_eq!(pool.len(), 1);
        assert!(matches!(
            pool.manager("alpha").await,
            Err(Error::ClusterNotFound(_))
        ));
        assert!(alpha.is_closed(), "removed manager must be closed");
    }

    /// Story: rotating a cluster's kubeconfig replaces its manager on the
    /// next pass. The new manager carries the new fingerprint and the old
    /// one is closed; no old manager remains reachable through the pool.
    #[tokio::test]
    async fn story_config_drift_replaces_manager() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(record("gamma", "kc-v1"));
        let pool = pool_over(registry.clone());

        pool.reconcile_once().await.expect("pass");
        let before = pool.manager("gamma").await.expect("gamma");

        registry.upsert_cluster(record("gamma", "kc-v2"));
        pool.reconcile_once().await.expect("pass");

        let after = pool.manager("gamma").await.expect("gamma");
        assert!(!Arc::ptr_eq(&before, &after), "manager must be replaced");
        assert_eq!(after.fingerprint(), record("gamma", "kc-v2").fingerprint());
        assert!(before.is_closed(), "replaced manager must be closed");
        assert!(!after.is_closed());
    }

    /// Story: an unchanged record is skipped - the same manager instance
    /// stays published across passes.
    #[tokio::test]
    async fn story_unchanged_cluster_is_not_rebuilt() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(record("delta", "kc"));
        let pool = pool_over(registry);

        pool.reconcile_once().await.expect("pass");
        let first = pool.manager("delta").await.expect("delta");
        pool.reconcile_once().await.expect("pass");
        let second = pool.manager("delta").await.expect("delta");
        assert!(Arc::ptr_eq(&first, &second));
    }

    // =========================================================================
    // Lookup Semantics Stories
    // =========================================================================

    /// Story: a miss triggers a synchronous pass, so a cluster registered
    /// moments ago is usable without waiting for the periodic reconciler.
    #[tokio::test]
    async fn story_lookup_miss_triggers_refresh() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(record("epsilon", "kc"));
        let pool = pool_over(registry);

        assert!(pool.is_empty());
        assert!(pool.manager("epsilon").await.is_ok());
        assert_eq!(pool.len(), 1);
    }

    /// Story: a manager whose snapshot says maintaining is refused even
    /// while still present in the pool.
    #[tokio::test]
    async fn story_maintaining_cluster_is_refused() {
        use crate::registry::MockClusterRegistry;

        let mut registry = MockClusterRegistry::new();
        registry.expect_list_clusters().returning(|| {
            Ok(vec![ClusterRecord {
                name: "zeta".into(),
                master: "https://zeta:6443".into(),
                kubeconfig: "kc".into(),
                status: ClusterStatus::Maintaining,
                deleted: false,
            }])
        });
        let pool = ClusterPool::with_factory(Arc::new(registry), Arc::new(OfflineFactory));

        pool.reconcile_once().await.expect("pass");
        assert!(matches!(
            pool.manager("zeta").await,
            Err(Error::ClusterMaintaining(_))
        ));
    }

    /// Story: one failing construction does not break the pass for the
    /// other clusters, and the failed cluster stays absent.
    #[tokio::test]
    async fn story_partial_construction_failure_is_isolated() {
        struct FlakyFactory;

        #[async_trait]
        impl ManagerFactory for FlakyFactory {
            async fn build(&self, record: &ClusterRecord) -> Result<Arc<ClusterManager>> {
                if record.name == "bad" {
                    return Err(Error::Kubeconfig("bad: unreachable".into()));
                }
                Ok(ClusterManager::with_client(
                    offline_client(),
                    record.clone(),
                    ResourceMap::default(),
                ))
            }
        }

        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(record("good", "kc"));
        registry.upsert_cluster(record("bad", "kc"));
        let pool = ClusterPool::with_factory(registry, Arc::new(FlakyFactory));

        pool.reconcile_once().await.expect("pass");
        assert_eq!(pool.len(), 1);
        assert!(pool.manager("good").await.is_ok());
        assert!(matches!(
            pool.manager("bad").await,
            Err(Error::ClusterNotFound(_))
        ));
    }
}
