use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::naming::protocol::{
    self, escape_token, LookupRequest, END_OF_FILE, ERROR_PREFIX, IDENTITY_CLIENT, OP_CREATE,
    OP_DELETE, OP_INFO, OP_READ, OP_WRITE,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no server found for path {0}")]
    NotFound(String),

    #[error("server error: {0}")]
    Remote(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("connection closed by peer")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A lookup connection to the naming service. Sends the `CLIENT` identity
/// once, then any number of resolutions.
pub struct NamingSession {
    stream: BufReader<TcpStream>,
}

impl NamingSession {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let mut stream = BufReader::new(stream);
        protocol::write_line(&mut stream, IDENTITY_CLIENT).await?;
        Ok(Self { stream })
    }

    /// Resolves a path to the data-plane address of the node serving it.
    pub async fn resolve(&mut self, path: &str) -> Result<SocketAddr, ClientError> {
        let request = LookupRequest::GetServer {
            path: path.to_string(),
        };
        protocol::write_line(&mut self.stream, &request.to_line()).await?;

        let reply = self.read_reply().await?;
        if reply.starts_with(ERROR_PREFIX) {
            debug!("Lookup miss for {}: {}", path, reply);
            return Err(ClientError::NotFound(path.to_string()));
        }

        let mut tokens = reply.split(' ');
        let ip: IpAddr = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| ClientError::MalformedResponse(reply.clone()))?;
        let port: u16 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| ClientError::MalformedResponse(reply.clone()))?;
        Ok(SocketAddr::new(ip, port))
    }

    async fn read_reply(&mut self) -> Result<String, ClientError> {
        let mut reply = String::new();
        if self.stream.read_line(&mut reply).await? == 0 {
            return Err(ClientError::Disconnected);
        }
        Ok(reply.trim_end().to_string())
    }
}

/// A data-plane connection to one storage node.
pub struct StorageSession {
    stream: BufReader<TcpStream>,
}

impl StorageSession {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Fetches a file's contents: everything up to the `END_OF_FILE`
    /// sentinel line.
    pub async fn read(&mut self, path: &str) -> Result<String, ClientError> {
        self.send_command(OP_READ, path).await?;

        let mut lines: Vec<String> = Vec::new();
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await? == 0 {
                return Err(ClientError::Disconnected);
            }
            let line = line.trim_end_matches('\n').to_string();
            if line == END_OF_FILE {
                break;
            }
            if lines.is_empty() && line.starts_with(ERROR_PREFIX) {
                return Err(ClientError::Remote(line));
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Writes `data` as the file's new contents. Returns the node's status line.
    pub async fn write(&mut self, path: &str, data: &str) -> Result<String, ClientError> {
        self.send_command(OP_WRITE, path).await?;
        protocol::write_line(&mut self.stream, data).await?;
        self.read_status().await
    }

    pub async fn create(&mut self, path: &str) -> Result<String, ClientError> {
        self.send_command(OP_CREATE, path).await?;
        self.read_status().await
    }

    pub async fn delete(&mut self, path: &str) -> Result<String, ClientError> {
        self.send_command(OP_DELETE, path).await?;
        self.read_status().await
    }

    /// Size and permissions, as reported by the node.
    pub async fn info(&mut self, path: &str) -> Result<String, ClientError> {
        self.send_command(OP_INFO, path).await?;
        self.read_status().await
    }

    async fn send_command(&mut self, op: &str, path: &str) -> Result<(), ClientError> {
        let line = format!("{} {}", op, escape_token(path));
        protocol::write_line(&mut self.stream, &line).await?;
        Ok(())
    }

    async fn read_status(&mut self) -> Result<String, ClientError> {
        let mut status = String::new();
        if self.stream.read_line(&mut status).await? == 0 {
            return Err(ClientError::Disconnected);
        }
        let status = status.trim_end().to_string();
        if status.starts_with(ERROR_PREFIX) {
            return Err(ClientError::Remote(status));
        }
        Ok(status)
    }
}
