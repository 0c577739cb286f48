//! Connected client bundle for one cluster
//!
//! A manager owns everything built from a cluster record's kubeconfig: the
//! client, the discovered resource map, and the informer set. External code
//! refers to a cluster by name through the pool, never by retained pointer,
//! so replacing a manager is an atomic map swap followed by closing the old
//! value.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::reflector::Store;
use kube::{Client, Config};
use tracing::{debug, info};

use super::InformerSet;
use crate::error::Error;
use crate::registry::ClusterRecord;
use crate::resource::ResourceMap;
use crate::Result;

/// A live, cache-backed client for one cluster
pub struct ClusterManager {
    record: ClusterRecord,
    fingerprint: String,
    client: Client,
    resource_map: Arc<ResourceMap>,
    informers: InformerSet,
}

impl ClusterManager {
    /// Build a manager from a registry record: parse the kubeconfig, wire
    /// the client, discover the resource map, and start the informer set.
    ///
    /// Any failure aborts the whole construction; a partially built manager
    /// is never observable.
    pub async fn connect(record: &ClusterRecord) -> Result<Arc<Self>> {
        let kubeconfig = Kubeconfig::from_yaml(&record.kubeconfig)
            .map_err(|e| Error::Kubeconfig(format!("{}: {e}", record.name)))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::Kubeconfig(format!("{}: {e}", record.name)))?;
        let client = Client::try_from(config)?;

        let resource_map = Arc::new(ResourceMap::discover(client.clone()).await?);
        let informers = InformerSet::start(&client, &resource_map, &record.name);

        info!(
            cluster = %record.name,
            master = %record.master,
            kinds = resource_map.len(),
            "cluster manager connected"
        );

        Ok(Arc::new(Self {
            fingerprint: record.fingerprint(),
            record: record.clone(),
            client,
            resource_map,
            informers,
        }))
    }

    /// Assemble a manager around an existing client without informers, for
    /// tests and embedding
    pub fn with_client(client: Client, record: ClusterRecord, map: ResourceMap) -> Arc<Self> {
        Arc::new(Self {
            fingerprint: record.fingerprint(),
            record,
            client,
            resource_map: Arc::new(map),
            informers: InformerSet::empty(),
        })
    }

    /// The record snapshot this manager was built from
    pub fn record(&self) -> &ClusterRecord {
        &self.record
    }

    /// Structural fingerprint of the record at build time
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The underlying client
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The immutable per-cluster resource map
    pub fn resource_map(&self) -> Arc<ResourceMap> {
        self.resource_map.clone()
    }

    /// Informer store for a plural kind, when that kind is informed
    pub fn store(&self, kind: &str) -> Option<&Store<DynamicObject>> {
        self.informers.store(kind)
    }

    /// Whether the informer caches have completed their initial list
    pub fn cache_ready(&self) -> bool {
        self.informers.ready()
    }

    /// Stop the informer set; called exactly once by the reconciler when
    /// this manager is removed or replaced
    pub fn close(&self) {
        debug!(cluster = %self.record.name, "closing cluster manager");
        self.informers.stop();
    }

    /// Whether this manager has been closed
    pub fn is_closed(&self) -> bool {
        self.informers.is_stopped()
    }
}
