//! Periodic registry-to-pool reconciliation

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ClusterPool;

/// Long-lived task driving the pool towards the registry
pub struct Reconciler {
    pool: Arc<ClusterPool>,
    period: Duration,
}

impl Reconciler {
    /// Create a reconciler over the pool with the given pass period
    pub fn new(pool: Arc<ClusterPool>, period: Duration) -> Self {
        Self { pool, period }
    }

    /// Run passes forever until the shutdown token fires
    ///
    /// A new pass starts every period regardless of how long the previous
    /// one took; the pool's pass lock guarantees passes never overlap.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("reconciler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.pool.reconcile_once().await {
                        warn!(error = %e, "reconcile pass failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClusterRecord, ClusterStatus, MemoryRegistry};
    use crate::resource::ResourceMap;
    use crate::cluster::{ClusterManager, ManagerFactory};
    use async_trait::async_trait;

    struct OfflineFactory;

    #[async_trait]
    impl ManagerFactory for OfflineFactory {
        async fn build(&self, record: &ClusterRecord) -> crate::Result<Arc<ClusterManager>> {
            let config = kube::Config::new("http://127.0.0.1:1".parse().expect("uri"));
            let client = kube::Client::try_from(config).expect("client");
            Ok(ClusterManager::with_client(
                client,
                record.clone(),
                ResourceMap::default(),
            ))
        }
    }

    /// The background loop picks up registry changes without explicit
    /// passes, and stops promptly on shutdown.
    #[tokio::test(start_paused = true)]
    async fn loop_reconciles_and_honors_shutdown() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.upsert_cluster(ClusterRecord {
            name: "alpha".into(),
            master: "https://alpha:6443".into(),
            kubeconfig: "kc".into(),
            status: ClusterStatus::Normal,
            deleted: false,
        });

        let pool = ClusterPool::with_factory(registry, Arc::new(OfflineFactory));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            Reconciler::new(pool.clone(), Duration::from_secs(5)).run(shutdown.clone()),
        );

        // First tick fires immediately; let the pass complete
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pool.len(), 1);

        shutdown.cancel();
        task.await.expect("reconciler task");
    }
}
