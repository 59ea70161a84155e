use distributed_dfs::node::agent::{AgentConfig, StorageNodeAgent};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 7 {
        eprintln!(
            "Usage: {} --naming <addr:port> --control-port <p> --data-port <p> [--advertise <ip>] <root>...",
            args[0]
        );
        eprintln!(
            "Example: {} --naming 127.0.0.1:4000 --control-port 8001 --data-port 9001 ./files",
            args[0]
        );

        std::process::exit(1);
    }

    let mut naming_addr: Option<SocketAddr> = None;
    let mut control_port: Option<u16> = None;
    let mut data_port: Option<u16> = None;
    let mut advertise_ip: IpAddr = "127.0.0.1".parse()?;
    let mut roots: Vec<PathBuf> = vec![];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--naming" => {
                naming_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--control-port" => {
                control_port = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--data-port" => {
                data_port = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--advertise" => {
                advertise_ip = args[i + 1].parse()?;
                i += 2;
            }
            root => {
                roots.push(PathBuf::from(root));
                i += 1;
            }
        }
    }

    let config = AgentConfig {
        naming_addr: naming_addr.expect("--naming is required"),
        advertise_ip,
        control_port: control_port.expect("--control-port is required"),
        data_port: data_port.expect("--data-port is required"),
        roots,
    };

    tracing::info!(
        "Starting storage node (advertising {}:{}, naming service {})",
        config.advertise_ip,
        config.data_port,
        config.naming_addr
    );

    // Registration failure is fatal: the node never serves unregistered.
    StorageNodeAgent::new(config).run().await
}
