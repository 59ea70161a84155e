use anyhow::Result;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::naming::protocol::{
    self, unescape_token, END_OF_FILE, OP_CREATE, OP_DELETE, OP_INFO, OP_READ, OP_WRITE,
};

type FrameReader = Lines<BufReader<OwnedReadHalf>>;

/// Accept loop for the node's data port. Each client connection gets its own
/// task running the command loop until disconnect.
pub async fn serve(listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("Data connection from {}", peer);
        tokio::spawn(async move {
            handle_connection(stream, peer).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Data client {} disconnected", peer);
                return;
            }
            Err(e) => {
                debug!("Data connection read error from {}: {}", peer, e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let mut tokens = line.trim().splitn(2, ' ');
        let op = tokens.next().unwrap_or("");
        let path = match tokens.next().map(|raw| unescape_token(raw.trim())) {
            Some(Ok(path)) => path,
            Some(Err(e)) => {
                let _ = protocol::write_line(&mut writer, &e.to_wire()).await;
                return;
            }
            None => {
                let _ = protocol::write_line(&mut writer, "Error: missing path argument").await;
                return;
            }
        };

        let result = match op {
            OP_READ => handle_read(&mut writer, &path).await,
            OP_WRITE => handle_write(&mut lines, &mut writer, &path).await,
            OP_CREATE => handle_create(&mut writer, &path).await,
            OP_DELETE => handle_delete(&mut writer, &path).await,
            OP_INFO => handle_info(&mut writer, &path).await,
            other => {
                warn!("Unrecognized data operation from {}: {}", peer, other);
                let _ = protocol::write_line(
                    &mut writer,
                    &format!("Error: unrecognized operation: {}", other),
                )
                .await;
                return;
            }
        };

        if let Err(e) = result {
            debug!("Data connection {} write error: {}", peer, e);
            return;
        }
    }
}

/// Sends the raw file bytes followed by the `END_OF_FILE` sentinel line.
async fn handle_read(writer: &mut OwnedWriteHalf, path: &str) -> std::io::Result<()> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("READ {} ({} bytes)", path, bytes.len());
            writer.write_all(&bytes).await?;
            writer.write_all(b"\n").await?;
            protocol::write_line(writer, END_OF_FILE).await
        }
        Err(e) => {
            debug!("READ {} failed: {}", path, e);
            protocol::write_line(writer, "Error: file not found or unable to open").await
        }
    }
}

/// The line after `WRITE <path>` is the payload.
async fn handle_write(
    lines: &mut FrameReader,
    writer: &mut OwnedWriteHalf,
    path: &str,
) -> std::io::Result<()> {
    let data = match lines.next_line().await {
        Ok(Some(data)) => data,
        _ => {
            return protocol::write_line(writer, "Error: missing write payload").await;
        }
    };

    match tokio::fs::write(path, data.as_bytes()).await {
        Ok(()) => {
            debug!("WRITE {} ({} bytes)", path, data.len());
            protocol::write_line(writer, "File written successfully").await
        }
        Err(e) => {
            debug!("WRITE {} failed: {}", path, e);
            protocol::write_line(writer, "Error: unable to write to file").await
        }
    }
}

async fn handle_create(writer: &mut OwnedWriteHalf, path: &str) -> std::io::Result<()> {
    match tokio::fs::File::create(path).await {
        Ok(_) => {
            debug!("CREATE {}", path);
            protocol::write_line(writer, "File created successfully").await
        }
        Err(e) => {
            debug!("CREATE {} failed: {}", path, e);
            protocol::write_line(writer, "Error: unable to create file").await
        }
    }
}

async fn handle_delete(writer: &mut OwnedWriteHalf, path: &str) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("DELETE {}", path);
            protocol::write_line(writer, "File deleted successfully").await
        }
        Err(e) => {
            debug!("DELETE {} failed: {}", path, e);
            protocol::write_line(writer, "Error: unable to delete file").await
        }
    }
}

async fn handle_info(writer: &mut OwnedWriteHalf, path: &str) -> std::io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let mode = meta.permissions().mode() & 0o777;
            protocol::write_line(
                writer,
                &format!("Size: {} bytes, Permissions: {:o}", meta.len(), mode),
            )
            .await
        }
        Err(e) => {
            debug!("INFO {} failed: {}", path, e);
            protocol::write_line(writer, "Error: unable to retrieve file info").await
        }
    }
}
