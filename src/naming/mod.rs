//! Naming Service Module
//!
//! The directory half of the system: accepts connections from storage nodes
//! and clients, keeps the registry and routing index consistent, and answers
//! path-resolution queries.
//!
//! ## Architecture Overview
//! 1. **Dispatch**: every accepted connection starts with a one-shot identity
//!    line (`STORAGE_SERVER` or `CLIENT`) that routes it to the registration
//!    or lookup handler. Anything else closes the connection with no side
//!    effects.
//! 2. **Registration**: a storage node's announcement is validated as a whole
//!    before any shared state changes (all-or-nothing), its paths are
//!    published into the index, and the connection stays open as the node's
//!    control channel so a disconnect can flip its liveness flag.
//! 3. **Lookup**: clients issue any number of `GET_SERVER` requests on one
//!    connection; each resolves through the index alone, never by contacting
//!    a storage node.
//!
//! ## Submodules
//! - **`protocol`**: line framing, token escaping, and message parsing.
//! - **`server`**: listener, shutdown supervision, per-connection dispatch.
//! - **`handlers`**: the registration and lookup connection handlers.

pub mod handlers;
pub mod protocol;
pub mod server;

#[cfg(test)]
mod tests;
