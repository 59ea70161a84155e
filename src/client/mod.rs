//! Client Module
//!
//! The consumer side of both protocols: a `NamingSession` resolves paths
//! through the naming service, and a `StorageSession` runs file operations
//! against the storage node the resolution named. Resolution and data
//! transfer are independent connections; the naming service is never in the
//! data path.

pub mod session;
