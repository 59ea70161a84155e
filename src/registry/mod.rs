//! Node Registry & Path Index Module
//!
//! The two shared structures at the heart of the naming service:
//!
//! - **`NodeRegistry`**: the authoritative, capacity-bounded list of storage
//!   nodes. Owns node lifetime (`Arc<StorageNode>`) and the liveness flag.
//!   Nodes are never removed while the process runs; a node that loses its
//!   control connection is only marked dead.
//! - **`PathIndex`**: the concurrent path -> node routing structure. Holds
//!   back-references only (`Weak`), so the registry stays the single owner.
//!
//! Both are internally synchronized and safe to share across any number of
//! connection handler tasks.

pub mod index;
pub mod registry;
pub mod types;
