use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::handlers;
use super::protocol::Identity;
use crate::registry::index::PathIndex;
use crate::registry::registry::NodeRegistry;

pub const DEFAULT_MAX_NODES: usize = 10;

/// The naming service: owns the registry and the index for its whole
/// lifecycle and hands shared references to every connection handler.
pub struct NamingServer {
    registry: Arc<NodeRegistry>,
    index: Arc<PathIndex>,
}

impl NamingServer {
    pub fn new(max_nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(NodeRegistry::new(max_nodes)),
            index: Arc::new(PathIndex::new()),
        })
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<PathIndex> {
        &self.index
    }

    /// Binds the listener and spawns the accept loop. The returned handle
    /// owns the shutdown signal; awaiting [`NamingServerHandle::shutdown`]
    /// (or dropping the handle) stops the accept loop and every connection
    /// task.
    pub async fn serve(self: Arc<Self>, bind_addr: SocketAddr) -> Result<NamingServerHandle> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Naming server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            self.accept_loop(listener, shutdown_rx).await;
        });

        Ok(NamingServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            let server = self.clone();
                            connections.spawn(async move {
                                server.dispatch(stream, peer).await;
                            });
                        }
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!(
            "Naming server shutting down, stopping {} connection task(s)",
            connections.len()
        );
        connections.shutdown().await;
    }

    /// Per-connection state machine:
    /// `AWAIT_IDENTITY -> {REGISTRATION | LOOKUP} -> CLOSED`.
    ///
    /// The identity line is read exactly once. A disconnect or an
    /// unrecognized token closes the connection with no side effects.
    async fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let identity_line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("{} disconnected before identifying", peer);
                return;
            }
            Err(e) => {
                debug!("Failed to read identity from {}: {}", peer, e);
                return;
            }
        };

        let result = match Identity::parse(&identity_line) {
            Some(Identity::StorageServer) => {
                handlers::handle_registration(
                    &mut lines,
                    &mut write_half,
                    peer,
                    &self.registry,
                    &self.index,
                )
                .await
            }
            Some(Identity::Client) => {
                handlers::handle_lookup(&mut lines, &mut write_half, peer, &self.index).await
            }
            None => {
                debug!("Unrecognized identity from {}: {:?}", peer, identity_line);
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!("Connection {} closed with error: {}", peer, e);
        }
    }
}

/// Handle to a running naming server. Shutting down stops the accept loop
/// and every in-flight connection task, so tests can tear the registry and
/// index down deterministically.
pub struct NamingServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl NamingServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
