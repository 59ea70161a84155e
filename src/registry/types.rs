use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The details a storage node announces about itself when registering.
///
/// `paths` is the flattened list of regular files the node can serve, in the
/// order the node declared them.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub ip: IpAddr,
    pub control_port: u16,
    pub data_port: u16,
    pub paths: Vec<String>,
}

/// A registered storage node.
///
/// Created by the registry on successful registration and handed out as
/// `Arc<StorageNode>`. The liveness flag is the only mutable field: it is
/// cleared when the node's control connection drops and never set back
/// without a fresh registration.
#[derive(Debug)]
pub struct StorageNode {
    pub id: NodeId,
    pub ip: IpAddr,
    pub control_port: u16,
    pub data_port: u16,
    pub paths: Vec<String>,
    alive: AtomicBool,
}

impl StorageNode {
    pub(crate) fn new(id: NodeId, info: NodeInfo) -> Self {
        Self {
            id,
            ip: info.ip,
            control_port: info.control_port,
            data_port: info.data_port,
            paths: info.paths,
            alive: AtomicBool::new(true),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn set_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Address clients use for file operations.
    pub fn data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.data_port)
    }

    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.control_port)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("maximum number of storage servers reached")]
    Full,
}
