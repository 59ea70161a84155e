use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{info, warn};

use super::types::{NodeId, NodeInfo, RegistryError, StorageNode};

pub struct NodeRegistry {
    nodes: DashMap<NodeId, Arc<StorageNode>>,
    // Serializes the capacity check-then-insert in register(); reads and
    // diagnostics iteration go straight to the sharded map.
    admission: Mutex<()>,
    capacity: usize,
}

impl NodeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: DashMap::new(),
            admission: Mutex::new(()),
            capacity,
        }
    }

    /// Admits a storage node if capacity remains.
    ///
    /// All-or-nothing: a `Full` rejection leaves the registry untouched. The
    /// returned handle is the registry's own `Arc`; the caller is expected to
    /// publish the node's paths into the index before acknowledging the
    /// registration on the wire.
    pub fn register(&self, info: NodeInfo) -> Result<Arc<StorageNode>, RegistryError> {
        let _admit = self.admission.lock().expect("registry admission lock poisoned");

        if self.nodes.len() >= self.capacity {
            warn!(
                "Rejecting registration from {}:{}: registry full ({} nodes)",
                info.ip, info.control_port, self.capacity
            );
            return Err(RegistryError::Full);
        }

        let node = Arc::new(StorageNode::new(NodeId::new(), info));
        self.nodes.insert(node.id.clone(), node.clone());

        info!(
            "Storage node registered: {:?} at {}:{} serving {} path(s)",
            node.id,
            node.ip,
            node.control_port,
            node.paths.len()
        );

        Ok(node)
    }

    /// Flips the node's liveness flag. The entry and its index mappings stay;
    /// lookups keep resolving to the (now stale) address and the client's
    /// connection attempt surfaces the failure.
    pub fn mark_dead(&self, node: &StorageNode) {
        node.set_dead();
        warn!(
            "Storage node {:?} at {}:{} marked dead",
            node.id, node.ip, node.control_port
        );
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<StorageNode>> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    /// Diagnostics iteration. Walks the sharded map without taking the
    /// admission lock, so a concurrent registration is never blocked on it.
    pub fn snapshot(&self) -> Vec<Arc<StorageNode>> {
        self.nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn alive_nodes(&self) -> Vec<Arc<StorageNode>> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
