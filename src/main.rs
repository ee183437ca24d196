//! MemoryDB - A Small In-Memory Key-Value Server
//!
//! This is the main entry point for the MemoryDB server.
//! It parses the command line, starts the server and stops it on Ctrl+C or SIGTERM.

use memorydb::{CliAction, Config, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    println!(
        r#"
MemoryDB - A Small In-Memory Key-Value Server

USAGE:
    memorydb [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>        Port to listen on (default: 8080)
        --snapshot <PATH>    Snapshot file written on shutdown (default: db.json)
        --restore            Load the snapshot file at startup
    -v, --version            Print version information
        --help               Print this help message

EXAMPLES:
    memorydb                         # Start on 0.0.0.0:8080
    memorydb --port 9000             # Start on port 9000
    memorydb --restore               # Pick up where the last run left off

CONNECTING:
    Use telnet or netcat:
    $ nc localhost 8080
    Welcome to MemoryDB server
    -> set name ferris 1m
    Set value for key name, expires in 1m0s
    -> get name
    ferris
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memorydb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("MemoryDB version {}", memorydb::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_help();
            std::process::exit(1);
        }
    };

    info!(version = memorydb::VERSION, "Starting MemoryDB server");
    info!(
        max_users = config.max_users,
        capacity = config.capacity,
        default_ttl = ?config.default_ttl,
        sweep_interval = ?config.sweep_interval,
        "Configuration loaded"
    );

    let server = Server::bind(config).await?;
    info!(addr = %server.local_addr(), "Ready to accept connections");

    let mut running = server.start();
    shutdown_signal().await;

    let summary = running.stop().await;
    if !summary.snapshot_saved {
        error!("Snapshot was not saved");
    }
    info!(saved = summary.saved_entries, "Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}
