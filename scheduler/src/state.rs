//! Shared view of the schedulable nodes and their pools, refreshed by the
//! pool reports and read concurrently by every scheduling cycle.

use api::StoragePool;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Default, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// One schedulable node: its pool report plus the node-local facts the
/// filter predicates judge.
#[derive(Debug, Default, Clone)]
pub struct Node {
    pub info: NodeInfo,
    pub pool: StoragePool,
    /// Last observed SPDK target liveness on this node.
    pub spdk_healthy: bool,
    /// Volumes this node's pool serves to pods on other nodes.
    pub remote_volume_count: u32,
    /// Names of the volumes allocated from this node's pool.
    pub hosted_volumes: Vec<String>,
}

/// All known nodes, keyed by name. Updates replace the whole node record,
/// readers clone the `Arc`.
#[derive(Debug, Default)]
pub struct ClusterState {
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl ClusterState {
    pub fn upsert(&self, node: Node) {
        self.nodes
            .write()
            .insert(node.info.name.clone(), Arc::new(node));
    }

    pub fn remove(&self, name: &str) {
        self.nodes.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.read().get(name).cloned()
    }

    /// Snapshot of all nodes, for scoring passes.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }
}
