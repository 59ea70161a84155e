use distributed_dfs::client::session::{ClientError, NamingSession, StorageSession};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} --naming <addr:port>", args[0]);
        eprintln!("Commands: READ <path> | WRITE <path> <data> | CREATE <path> |");
        eprintln!("          DELETE <path> | INFO <path> | EXIT");

        std::process::exit(1);
    }

    let mut naming_addr: Option<SocketAddr> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--naming" => {
                naming_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let naming_addr = naming_addr.expect("--naming is required");
    let mut naming = NamingSession::connect(naming_addr).await?;
    println!("Connected to naming service at {}", naming_addr);

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.splitn(3, ' ');
        let command = tokens.next().unwrap_or("").to_uppercase();
        if command == "EXIT" || command == "QUIT" {
            break;
        }

        let path = match tokens.next() {
            Some(path) => path.to_string(),
            None => {
                println!("Error: missing path argument");
                continue;
            }
        };

        let node_addr = match naming.resolve(&path).await {
            Ok(addr) => addr,
            Err(ClientError::NotFound(_)) => {
                println!("Error: no server found for the requested path");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut storage = match StorageSession::connect(node_addr).await {
            Ok(session) => session,
            Err(e) => {
                // Stale route: the naming service still maps the path to a
                // node that has since gone away.
                println!("Error: storage node {} unreachable ({})", node_addr, e);
                continue;
            }
        };

        let outcome = match command.as_str() {
            "READ" => storage.read(&path).await,
            "WRITE" => match tokens.next() {
                Some(data) => storage.write(&path, data).await,
                None => {
                    println!("Error: WRITE needs a data argument");
                    continue;
                }
            },
            "CREATE" => storage.create(&path).await,
            "DELETE" => storage.delete(&path).await,
            "INFO" => storage.info(&path).await,
            other => {
                println!("Error: unrecognized command: {}", other);
                continue;
            }
        };

        match outcome {
            Ok(output) => println!("{}", output),
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}
