//! TCP broadcast chat server
//!
//! Every connected client registers a display name with its first message;
//! everything it sends afterwards is relayed to all connected clients,
//! together with a live participant roster.
//!
//! Usage:
//!   palaver <port>

use palaver::{ChatConfig, ChatServer};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let port = match args.get(1).map(|a| a.parse::<u16>()) {
        Some(Ok(port)) => port,
        _ => {
            print_usage();
            return Ok(());
        }
    };

    let config = ChatConfig {
        bind_addr: ([0, 0, 0, 0], port).into(),
        ..Default::default()
    };

    let server = match ChatServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind listening endpoint: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }
    server.shutdown().await;

    Ok(())
}

fn print_usage() {
    println!("palaver - broadcast chat server");
    println!();
    println!("USAGE:");
    println!("    palaver <port>");
    println!();
    println!("The server accepts any number of clients on the given TCP port.");
    println!("Each client's first message registers its display name; every");
    println!("later message is relayed to all connected clients.");
    println!();
    println!("EXAMPLES:");
    println!("    palaver 6667");
    println!("    RUST_LOG=debug palaver 6667");
}
