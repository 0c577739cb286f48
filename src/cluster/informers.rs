//! Reflector-backed caches for the hot kinds of one cluster
//!
//! Each cacheable kind in the resource map gets a watch task feeding a
//! shared store. All watch tasks of a manager hang off one cancellation
//! token, so stopping the set is a single cancel: started exactly once at
//! manager creation, stopped exactly once at manager close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::Store;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::resource::ResourceMap;

/// How long manager construction waits for the initial lists before
/// declaring the cache ready anyway
const CACHE_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// The set of informer stores owned by one cluster manager
pub struct InformerSet {
    stores: HashMap<String, Store<DynamicObject>>,
    cancel: CancellationToken,
    ready: Arc<AtomicBool>,
}

impl InformerSet {
    /// An empty set with no watch tasks, for managers built in tests
    pub fn empty() -> Self {
        let ready = Arc::new(AtomicBool::new(true));
        Self {
            stores: HashMap::new(),
            cancel: CancellationToken::new(),
            ready,
        }
    }

    /// Register and start one watch task per cacheable kind in the map
    pub fn start(client: &Client, map: &ResourceMap, cluster: &str) -> Self {
        let cancel = CancellationToken::new();
        let ready = Arc::new(AtomicBool::new(false));
        let mut stores = HashMap::new();

        for entry in map.cacheable_entries() {
            let ar = entry.api_resource();
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &ar);
            let writer = Writer::new(ar);
            let reader = writer.as_reader();

            let stop = cancel.child_token();
            let resource = entry.resource.clone();
            let cluster = cluster.to_string();
            tokio::spawn(async move {
                let stream = watcher(api, watcher::Config::default())
                    .default_backoff()
                    .reflect(writer)
                    .touched_objects();
                let mut stream = std::pin::pin!(stream);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        next = stream.try_next() => match next {
                            Ok(Some(_)) => {}
                            Ok(None) => break,
                            Err(e) => {
                                warn!(cluster = %cluster, resource = %resource, error = %e, "watch error");
                            }
                        }
                    }
                }
                debug!(cluster = %cluster, resource = %resource, "informer stopped");
            });

            stores.insert(entry.resource.clone(), reader);
        }

        let set = Self {
            stores,
            cancel,
            ready,
        };
        set.spawn_readiness_probe(cluster);
        set
    }

    /// Mark the set ready once every store has seen its initial list
    fn spawn_readiness_probe(&self, cluster: &str) {
        let stores: Vec<_> = self.stores.values().cloned().collect();
        let ready = self.ready.clone();
        let stop = self.cancel.child_token();
        let cluster = cluster.to_string();
        tokio::spawn(async move {
            let wait = async {
                for store in &stores {
                    let _ = store.wait_until_ready().await;
                }
            };
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = wait => {}
                _ = tokio::time::sleep(CACHE_READY_TIMEOUT) => {
                    warn!(cluster = %cluster, "informer caches not ready before timeout");
                }
            }
            ready.store(true, Ordering::Release);
            debug!(cluster = %cluster, "informer caches ready");
        });
    }

    /// Store for a plural kind name, when that kind is informed
    pub fn store(&self, kind: &str) -> Option<&Store<DynamicObject>> {
        self.stores.get(kind)
    }

    /// Whether every store has completed its initial list
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Stop every watch task; idempotent
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the set has been stopped
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for InformerSet {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_ready_and_storeless() {
        let set = InformerSet::empty();
        assert!(set.ready());
        assert!(set.store("pods").is_none());
        assert!(!set.is_stopped());
    }

    #[test]
    fn stop_is_idempotent() {
        let set = InformerSet::empty();
        set.stop();
        set.stop();
        assert!(set.is_stopped());
    }
}
