use anyhow::Result;
use std::net::SocketAddr;
use tokio::io::{BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

use super::protocol::{
    self, LookupRequest, RegistrationRequest, ACK_REGISTERED, ERROR_PREFIX, ERR_NO_SERVER,
};
use crate::registry::index::PathIndex;
use crate::registry::registry::NodeRegistry;
use crate::registry::types::NodeInfo;

type FrameReader = Lines<BufReader<OwnedReadHalf>>;

/// Handles a `STORAGE_SERVER` connection: one registration message, then the
/// connection becomes the node's long-lived control channel.
///
/// Registration is all-or-nothing. The message is validated in full before
/// any shared state changes; a malformed message or a full registry sends an
/// error line and leaves both the registry and the index untouched. On
/// success every declared path is published into the index before the
/// acknowledgment is written, so a lookup issued after the ack always
/// observes the complete mapping.
pub async fn handle_registration(
    lines: &mut FrameReader,
    writer: &mut OwnedWriteHalf,
    peer: SocketAddr,
    registry: &NodeRegistry,
    index: &PathIndex,
) -> Result<()> {
    let line = match lines.next_line().await? {
        Some(line) => line,
        None => {
            debug!("Storage node {} disconnected before registering", peer);
            return Ok(());
        }
    };

    let request = match RegistrationRequest::parse(&line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected registration from {}: {}", peer, e);
            protocol::write_line(writer, &e.to_wire()).await?;
            return Ok(());
        }
    };

    let node = match registry.register(NodeInfo {
        ip: request.ip,
        control_port: request.control_port,
        data_port: request.data_port,
        paths: request.paths,
    }) {
        Ok(node) => node,
        Err(e) => {
            protocol::write_line(writer, &format!("{} {}", ERROR_PREFIX, e)).await?;
            return Ok(());
        }
    };

    for path in &node.paths {
        index.insert(path, &node);
    }

    protocol::write_line(writer, ACK_REGISTERED).await?;
    info!(
        "Acknowledged registration of {:?} ({} path(s))",
        node.id,
        node.paths.len()
    );

    // Control channel steady state: nothing is expected from the node, and
    // reading until EOF is how its death is noticed.
    loop {
        match lines.next_line().await {
            Ok(Some(message)) => {
                debug!("Control message from {:?}: {}", node.id, message);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Control channel read error for {:?}: {}", node.id, e);
                break;
            }
        }
    }

    registry.mark_dead(&node);
    Ok(())
}

/// Handles a `CLIENT` connection: a sequence of independent lookup requests
/// until the client disconnects.
///
/// A path owned by a dead node still resolves to its registered address; the
/// staleness surfaces as a connect failure on the client's side, never as a
/// silent miss here. An unrecognized operation sends an error line and closes
/// the connection.
pub async fn handle_lookup(
    lines: &mut FrameReader,
    writer: &mut OwnedWriteHalf,
    peer: SocketAddr,
    index: &PathIndex,
) -> Result<()> {
    loop {
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                debug!("Client {} disconnected", peer);
                return Ok(());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request = match LookupRequest::parse(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Bad lookup request from {}: {}", peer, e);
                protocol::write_line(writer, &e.to_wire()).await?;
                return Ok(());
            }
        };

        let LookupRequest::GetServer { path } = request;
        match index.lookup(&path) {
            Some(node) => {
                if !node.is_alive() {
                    debug!("Routing {} to dead node {:?} (stale entry)", path, node.id);
                }
                protocol::write_line(writer, &format!("{} {}", node.ip, node.data_port)).await?;
            }
            None => {
                debug!("No storage node found for {}", path);
                protocol::write_line(writer, ERR_NO_SERVER).await?;
            }
        }
    }
}
