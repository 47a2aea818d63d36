use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use raft_server::{cli::Cli, http, LoggingStateMachine, Node};
use raft_storage::{FileStorage, InMemoryStorage, Storage};
use tokio::net::TcpListener;
use tracing::{info, warn};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn open_storage(cli: &Cli) -> Result<Box<dyn Storage>> {
    match &cli.data_dir {
        Some(dir) => {
            let storage = FileStorage::new(dir)
                .with_context(|| format!("failed to open data dir {}", dir.display()))?;
            info!(dir = %storage.dir().display(), "using file storage");
            Ok(Box::new(storage))
        }
        None => {
            warn!("no --data-dir given, raft state will not survive a restart");
            Ok(Box::new(InMemoryStorage::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let storage = open_storage(&cli)?;
    let node = Node::start(cli.id, &cli.raft_config(), storage, LoggingStateMachine)
        .context("failed to start node")?;
    let node = Arc::new(node);

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(node = cli.id, addr = %listener.local_addr()?, "running");

    http::serve(listener, Arc::clone(&node), shutdown_signal()).await?;

    match Arc::try_unwrap(node) {
        Ok(node) => node.shutdown().await,
        Err(_) => warn!("node still referenced after server exit, skipping clean shutdown"),
    }
    info!("exiting");
    Ok(())
}
