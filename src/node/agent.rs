use anyhow::{bail, Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::data;
use crate::naming::protocol::{
    self, RegistrationRequest, ACK_REGISTERED, IDENTITY_STORAGE_SERVER, MAX_PATHS_PER_NODE,
};

pub struct AgentConfig {
    pub naming_addr: SocketAddr,
    /// Address advertised to the naming service; clients connect to it.
    pub advertise_ip: IpAddr,
    pub control_port: u16,
    pub data_port: u16,
    /// Files or directories; directories are walked recursively.
    pub roots: Vec<PathBuf>,
}

pub struct StorageNodeAgent {
    config: AgentConfig,
}

impl StorageNodeAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Flattens the configured roots into the list of regular files the node
    /// serves, capped at `cap` entries. Plain-file roots pass through as-is;
    /// unreadable entries are skipped with a warning.
    pub fn collect_paths(roots: &[PathBuf], cap: usize) -> Vec<String> {
        let mut paths = Vec::new();
        for root in roots {
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if paths.len() >= cap {
                    warn!(
                        "Path cap of {} reached, ignoring remaining files under {}",
                        cap,
                        root.display()
                    );
                    return paths;
                }
                paths.push(entry.path().to_string_lossy().into_owned());
            }
        }
        paths
    }

    /// Connects to the naming service and performs the registration
    /// handshake. Returns the open control connection on success.
    ///
    /// Fails fast on connect failure or rejection: the node must never serve
    /// clients unregistered.
    pub async fn register(&self) -> Result<BufReader<TcpStream>> {
        let paths = Self::collect_paths(&self.config.roots, MAX_PATHS_PER_NODE);
        info!(
            "Registering {} path(s) with naming service at {}",
            paths.len(),
            self.config.naming_addr
        );

        let stream = TcpStream::connect(self.config.naming_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to connect to naming service at {}",
                    self.config.naming_addr
                )
            })?;
        let mut control = BufReader::new(stream);

        protocol::write_line(&mut control, IDENTITY_STORAGE_SERVER).await?;

        let request = RegistrationRequest {
            ip: self.config.advertise_ip,
            control_port: self.config.control_port,
            data_port: self.config.data_port,
            paths,
        };
        protocol::write_line(&mut control, &request.to_line()).await?;

        let mut reply = String::new();
        control.read_line(&mut reply).await?;
        let reply = reply.trim_end();
        if reply.is_empty() {
            bail!("naming service closed the connection during registration");
        }
        if reply != ACK_REGISTERED {
            bail!("registration rejected by naming service: {}", reply);
        }

        info!("Registered with naming service at {}", self.config.naming_addr);
        Ok(control)
    }

    /// Registers, then serves until either the data listener fails or the
    /// naming service drops the control connection.
    pub async fn run(self) -> Result<()> {
        let control = self.register().await?;

        let data_addr = SocketAddr::new(self.config.advertise_ip, self.config.data_port);
        let listener = TcpListener::bind(data_addr)
            .await
            .with_context(|| format!("failed to bind data listener on {}", data_addr))?;
        info!("Serving data connections on {}", data_addr);

        tokio::select! {
            result = data::serve(listener) => result,
            _ = control_loop(control) => {
                bail!("lost connection to naming service");
            }
        }
    }
}

/// Pass-through reader on the control connection. Nothing arrives in steady
/// state; index-maintenance notifications are logged, and EOF means the
/// naming service is gone.
async fn control_loop(control: BufReader<TcpStream>) {
    let mut lines = control.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(message)) => {
                debug!("Message from naming service: {}", message);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Control connection read error: {}", e);
                break;
            }
        }
    }
}
