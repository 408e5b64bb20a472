//! Reconcile authority server.
//!
//! Hosts shared documents over WebSocket until interrupted. Log level is
//! controlled through `RUST_LOG` (default `info`).

use clap::{Parser, ValueEnum};
use log::info;
use reconcile_collab::server::{AuthorAssignment, ServerConfig, SyncServer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Frames buffered per peer before it starts lagging
    #[arg(long, default_value_t = 256)]
    broadcast_capacity: usize,

    /// Maximum editors per document
    #[arg(long, default_value_t = 100)]
    max_peers: usize,

    /// How joining editors are assigned an author
    #[arg(short, long, value_enum, default_value_t = Assignment::Random)]
    assignment: Assignment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Assignment {
    Random,
    Alternate,
}

impl From<Assignment> for AuthorAssignment {
    fn from(assignment: Assignment) -> Self {
        match assignment {
            Assignment::Random => AuthorAssignment::Random,
            Assignment::Alternate => AuthorAssignment::Alternate,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: args.bind,
            max_peers_per_room: args.max_peers,
            broadcast_capacity: args.broadcast_capacity,
            author_assignment: args.assignment.into(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting authority on {} ({:?} assignment, {} peers per document)",
        config.bind_addr, config.author_assignment, config.max_peers_per_room
    );

    let server = SyncServer::new(config);
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}
