//! threadserv: a thread-per-connection TCP server and its relay client.
//!
//! - `serve`: accept connections, one handler thread each (echo or greeting)
//! - `connect`: relay the terminal to a server over one connection
//!
//! All socket I/O goes through the `runtime` primitives, which retry
//! interrupted syscalls and never hand back a partial result silently.

mod client;
mod config;
mod protocols;
mod runtime;
mod server;

use config::{Config, Mode};
use server::Server;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging. Stdout is reserved for relayed bytes.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match config.mode {
        Mode::Serve { listen } => run_server(listen, config),
        Mode::Connect { peer } => {
            client::run(peer, config.chunk_size)?;
            Ok(())
        }
    }
}

fn run_server(listen: SocketAddr, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %listen,
        backlog = config.backlog,
        protocol = ?config.protocol,
        line_capacity = config.line_capacity,
        "Starting threadserv server"
    );

    let server = Server::bind(listen, &config)?;
    server.run()?;
    Ok(())
}
