use anyhow::Result;
use clap::{Parser, Subcommand};
use forum_backend::cli;
use forum_backend::config::{ForumConfig, StorageBackend};
use forum_backend::node::ForumNode;
use forum_backend::telemetry;
use forum_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Discussion forum backend and shell")]
struct Args {
    /// Override the storage adapter (sqlite, json or memory)
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,
    /// Override the HTTP port
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) for REST/API access
    Serve,
    /// Start the interactive shell for browsing, posting and voting
    Cli,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing();

    let args = Args::parse();

    let mut config = ForumConfig::from_env()?;
    if let Some(storage) = args.storage {
        config.storage = storage;
    }
    if let Some(port) = args.port {
        config.api_port = port;
    }
    let node = ForumNode::start(config)?;

    match args.command.unwrap_or(Command::Cli) {
        Command::Serve => node.run_http_server().await,
        Command::Cli => {
            let snapshot = node.snapshot();
            cli::run_cli(snapshot.config, snapshot.database, snapshot.votes).await
        }
    }
}
