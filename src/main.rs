//! Castle Chess - Unified CLI
//!
//! Serves the shared game document, or joins it as a player.

#![warn(missing_docs)]

mod cli;
mod play;

use anyhow::Result;
use castle_chess::{ClientConfig, MemoryStore, SessionStore, SqliteStore, StoreKind};
use clap::Parser;
use cli::{Cli, Command};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr so the board on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::load_or_default(&cli.config)?.with_env_overrides()?;
    if let Some(game_id) = cli.game_id {
        config = config.with_game_id(game_id);
    }

    match cli.command {
        Command::Serve {
            port,
            host,
            db_path,
            memory,
        } => run_server(host, port, db_path, memory, &config).await,
        Command::Play {
            server_url,
            offline,
        } => {
            if offline {
                config = config.with_store(StoreKind::Offline);
            } else if let Some(url) = server_url {
                config = config.with_store_url(url);
            }
            play::run(config).await
        }
        Command::Show => play::show(config).await,
        Command::Reset { force } => play::reset(config, force).await,
    }
}

/// Run the game document server
async fn run_server(
    host: String,
    port: u16,
    db_path: String,
    memory: bool,
    config: &ClientConfig,
) -> Result<()> {
    let store: Arc<dyn SessionStore> = if memory {
        info!("Serving games from memory");
        Arc::new(MemoryStore::new())
    } else {
        info!(db_path = %db_path, "Serving games from SQLite");
        Arc::new(SqliteStore::open(db_path, config.poll_interval()).await?)
    };

    castle_chess::serve(host, port, store).await?;
    Ok(())
}
