use distributed_dfs::naming::server::{NamingServer, DEFAULT_MAX_NODES};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} --bind <addr:port> [--max-nodes <n>]", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:4000", args[0]);
        eprintln!("Example: {} --bind 0.0.0.0:4000 --max-nodes 32", args[0]);

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut max_nodes = DEFAULT_MAX_NODES;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--max-nodes" => {
                max_nodes = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");

    tracing::info!("Starting naming server on {}", bind_addr);
    tracing::info!("Registry capacity: {} storage node(s)", max_nodes);

    let server = NamingServer::new(max_nodes);
    let handle = server.clone().serve(bind_addr).await?;

    // Periodic diagnostics: walks the registry without blocking registrations.
    let stats_server = server.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let nodes = stats_server.registry().snapshot();
            tracing::info!(
                "Registry: {} node(s), {} indexed path(s)",
                nodes.len(),
                stats_server.index().len()
            );
            for node in nodes {
                tracing::info!(
                    "  - {:?} {}:{} data_port={} alive={} paths={}",
                    node.id,
                    node.ip,
                    node.control_port,
                    node.data_port,
                    node.is_alive(),
                    node.paths.len()
                );
            }
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    handle.shutdown().await;
    tracing::info!("Naming server stopped");

    Ok(())
}
