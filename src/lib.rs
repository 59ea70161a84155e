//! Distributed File Directory Library
//!
//! This library crate defines the core modules of a minimal distributed file
//! directory: a central naming service routes file paths to the storage nodes
//! serving them, and clients talk to those nodes directly for file I/O.
//! It is the foundation for the three binaries (`naming-server`,
//! `storage-node`, `dfs-client`).
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`registry`**: The shared-state core. A capacity-bounded `NodeRegistry`
//!   owning storage node records and their liveness flags, and a concurrent
//!   `PathIndex` routing path strings to the node serving them.
//! - **`naming`**: The naming service. Dispatches inbound connections by a
//!   one-shot identity frame, admits storage node registrations atomically,
//!   and answers client lookups over a newline-framed text protocol.
//! - **`node`**: The storage node. Walks its local roots at startup,
//!   registers the flattened path list, holds the control channel open, and
//!   serves file operations on its data port.
//! - **`client`**: Session types for consuming both protocols: resolve a
//!   path at the naming service, then run file operations against the node.

pub mod client;
pub mod naming;
pub mod node;
pub mod registry;
