//! yams-ipc - Command-line client for the YAMS daemon
//!
//! Connects to the daemon socket, runs one command and prints the result.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use yams_client::{ClientConfig, ClientError, DaemonClient, ReconnectConfig};

#[derive(Parser)]
#[command(name = "yams-ipc")]
#[command(about = "Talk to the YAMS daemon over its local socket")]
#[command(version)]
struct Cli {
    /// Daemon socket path (defaults to $YAMS_DAEMON_SOCKET or the runtime directory)
    #[arg(short, long, global = true)]
    socket: Option<PathBuf>,

    /// Request timeout in milliseconds
    #[arg(short = 't', long, global = true)]
    timeout_ms: Option<u64>,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the daemon
    Ping,

    /// Show daemon status
    Status {
        /// Include detailed component status
        #[arg(short, long)]
        detailed: bool,
    },

    /// Search documents
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Enable fuzzy matching
        #[arg(short, long)]
        fuzzy: bool,

        /// Only documents with all of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// List stored documents
    List {
        /// Maximum entries
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Skip this many entries
        #[arg(long, default_value = "0")]
        offset: u32,

        /// Name glob to filter on
        #[arg(short, long)]
        pattern: Option<String>,

        /// Most recently added first
        #[arg(short, long)]
        recent: bool,
    },

    /// Print a document's content
    Cat {
        /// Document hash
        #[arg(required_unless_present = "name")]
        hash: Option<String>,

        /// Document name (instead of hash)
        #[arg(short, long, conflicts_with = "hash")]
        name: Option<String>,
    },

    /// Search document content with a regular expression
    Grep {
        /// Pattern to match
        pattern: String,

        /// Restrict to these paths
        paths: Vec<String>,

        /// Case-insensitive matching
        #[arg(short, long)]
        ignore_case: bool,

        /// Lines of context around each match
        #[arg(short = 'C', long, default_value = "0")]
        context: u32,

        /// Stop after this many matches
        #[arg(short, long)]
        max_matches: Option<u32>,
    },

    /// Add a file or directory to the store
    Add {
        /// File or directory path
        path: PathBuf,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Document name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Recurse into directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Update a stored document
    Update {
        /// Document hash
        hash: String,

        /// Tag to add (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Tag to remove (repeatable)
        #[arg(long = "remove-tag")]
        remove_tags: Vec<String>,

        /// Replacement content (or @file to read it from a file)
        #[arg(short, long)]
        content: Option<String>,
    },

    /// Show documents related to a document
    Graph {
        /// Document hash
        hash: String,

        /// Traversal depth
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// Maximum nodes
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Switch the daemon's active session
    Session {
        /// Session name
        name: String,
    },
}

/// Loads the client configuration and applies command-line overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig, ClientError> {
    let mut config = ClientConfig::load()?;
    if let Some(socket) = &cli.socket {
        config = config.with_socket_path(socket);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }
    // A one-shot command has nothing to resume after a drop.
    Ok(config.with_reconnect(ReconnectConfig::disabled()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    let client = DaemonClient::new(config);
    tracing::debug!("Using daemon socket {}", client.socket_path().display());

    if let Err(e) = client.connect().await {
        eprintln!("{}: {}", "Connection failed".red(), e);
        std::process::exit(1);
    }

    let result = commands::execute(&client, cli.command, cli.json).await;
    client.dispose().await;

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
