//! Wire Protocol
//!
//! Newline-delimited text frames over TCP. Every frame is one line; tokens
//! within a line are space-separated. Path tokens are escaped so a path
//! containing the delimiter (or a newline) can never truncate or shift the
//! token stream.
//!
//! Frames exchanged with the naming service:
//! - Identity (first line of any connection): `STORAGE_SERVER` or `CLIENT`.
//! - Registration: `<ip> <control_port> <data_port> <count> <path_1> ... <path_N>`.
//! - Lookup request: `GET_SERVER <path>`; response `<ip> <data_port>` or an
//!   `Error:`-prefixed line.

use std::net::IpAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const IDENTITY_STORAGE_SERVER: &str = "STORAGE_SERVER";
pub const IDENTITY_CLIENT: &str = "CLIENT";

pub const OP_GET_SERVER: &str = "GET_SERVER";

// Data-plane operations, served by storage nodes and consumed by clients.
pub const OP_READ: &str = "READ";
pub const OP_WRITE: &str = "WRITE";
pub const OP_CREATE: &str = "CREATE";
pub const OP_DELETE: &str = "DELETE";
pub const OP_INFO: &str = "INFO";

pub const ACK_REGISTERED: &str = "Registration successful";
pub const ERROR_PREFIX: &str = "Error:";
pub const ERR_NO_SERVER: &str = "Error: no server found for the requested path";

/// Sentinel line terminating a `READ` payload on the data plane.
pub const END_OF_FILE: &str = "END_OF_FILE";

/// Upper bound on the paths a single node may declare. The agent caps its
/// filesystem walk at this count and the naming service rejects anything
/// larger rather than truncating.
pub const MAX_PATHS_PER_NODE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    StorageServer,
    Client,
}

impl Identity {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            IDENTITY_STORAGE_SERVER => Some(Self::StorageServer),
            IDENTITY_CLIENT => Some(Self::Client),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid registration format: {0}")]
    MalformedRegistration(&'static str),

    #[error("declared path count {declared} does not match {actual} path token(s)")]
    PathCountMismatch { declared: usize, actual: usize },

    #[error("declared path count {0} exceeds the per-node limit")]
    TooManyPaths(usize),

    #[error("unrecognized operation: {0}")]
    UnrecognizedOperation(String),

    #[error("missing path argument")]
    MissingPath,

    #[error("invalid escape sequence in token")]
    BadEscape,
}

impl ProtocolError {
    /// The error line sent back to the peer before closing the connection.
    pub fn to_wire(&self) -> String {
        format!("{} {}", ERROR_PREFIX, self)
    }
}

/// A storage node's announcement, as parsed from the second line of a
/// `STORAGE_SERVER` connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub ip: IpAddr,
    pub control_port: u16,
    pub data_port: u16,
    pub paths: Vec<String>,
}

impl RegistrationRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.trim().split(' ').filter(|t| !t.is_empty());

        let ip: IpAddr = tokens
            .next()
            .ok_or(ProtocolError::MalformedRegistration("missing ip"))?
            .parse()
            .map_err(|_| ProtocolError::MalformedRegistration("bad ip"))?;

        let control_port: u16 = tokens
            .next()
            .ok_or(ProtocolError::MalformedRegistration("missing control port"))?
            .parse()
            .map_err(|_| ProtocolError::MalformedRegistration("bad control port"))?;

        let data_port: u16 = tokens
            .next()
            .ok_or(ProtocolError::MalformedRegistration("missing data port"))?
            .parse()
            .map_err(|_| ProtocolError::MalformedRegistration("bad data port"))?;

        let declared: usize = tokens
            .next()
            .ok_or(ProtocolError::MalformedRegistration("missing path count"))?
            .parse()
            .map_err(|_| ProtocolError::MalformedRegistration("bad path count"))?;

        if declared > MAX_PATHS_PER_NODE {
            return Err(ProtocolError::TooManyPaths(declared));
        }

        let raw: Vec<&str> = tokens.collect();
        if raw.len() != declared {
            return Err(ProtocolError::PathCountMismatch {
                declared,
                actual: raw.len(),
            });
        }

        let paths = raw
            .into_iter()
            .map(unescape_token)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ip,
            control_port,
            data_port,
            paths,
        })
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.ip,
            self.control_port,
            self.data_port,
            self.paths.len()
        );
        for path in &self.paths {
            line.push(' ');
            line.push_str(&escape_token(path));
        }
        line
    }
}

/// A client request on a lookup connection. `GET_SERVER` is the only
/// recognized operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    GetServer { path: String },
}

impl LookupRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.trim().splitn(2, ' ');
        let op = tokens.next().unwrap_or("");
        match op {
            OP_GET_SERVER => {
                let raw = tokens.next().ok_or(ProtocolError::MissingPath)?;
                let path = unescape_token(raw.trim())?;
                Ok(Self::GetServer { path })
            }
            other => Err(ProtocolError::UnrecognizedOperation(other.to_string())),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            Self::GetServer { path } => format!("{} {}", OP_GET_SERVER, escape_token(path)),
        }
    }
}

/// Escapes a token so it contains neither the space delimiter nor a line
/// break: `\` -> `\\`, space -> `\s`, LF -> `\n`, CR -> `\r`.
pub fn escape_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_token(token: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            _ => return Err(ProtocolError::BadEscape),
        }
    }
    Ok(out)
}

/// Writes one protocol frame: the line plus the terminating newline.
pub async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
