//! Cluster manager pool and reconciliation
//!
//! The pool is the process-wide map from cluster name to a connected
//! [`ClusterManager`]. Only the reconciler mutates it; every other task
//! takes snapshots of the value pointer and never retains one past a single
//! request.

mod informers;
mod manager;
mod pool;
mod reconciler;

pub use informers::InformerSet;
pub use manager::ClusterManager;
pub use pool::{ClusterPool, ConnectFactory, ManagerFactory};
pub use reconciler::Reconciler;
