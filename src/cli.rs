//! Command-line interface for castle_chess.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Castle Chess - a chess board shared through a document store
#[derive(Parser, Debug)]
#[command(name = "castle_chess")]
#[command(about = "Two-player chess synchronized through a shared game document", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the client config file
    #[arg(short, long, global = true, default_value = "castle_chess.toml")]
    pub config: PathBuf,

    /// Game id to use instead of the configured one
    #[arg(long, global = true)]
    pub game_id: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game document server
    Serve {
        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// SQLite file backing the server
        #[arg(long, default_value = "castle_chess.db")]
        db_path: String,

        /// Keep games in memory only
        #[arg(long, conflicts_with = "db_path")]
        memory: bool,
    },

    /// Join the shared game and play from the terminal
    Play {
        /// Document server URL, overriding the config
        #[arg(long)]
        server_url: Option<String>,

        /// Play both sides locally without a store
        #[arg(long)]
        offline: bool,
    },

    /// Print the stored game and its board
    Show,

    /// Put a fresh game in the store
    Reset {
        /// Reset even if the game is still being played
        #[arg(long)]
        force: bool,
    },
}
