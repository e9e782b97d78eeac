//! # querybridge CLI
//!
//! Ask an Ethereum analytics database questions in plain language.
//!
//! ## Usage
//!
//! - `querybridge` - Start interactive chat
//! - `querybridge test` - Check configuration, tool server and a sample tool call
//! - `querybridge tools` - Show the tools exposed by the tool server

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

use commands::{interactive_command, test_command, tools_command};
use config::CliConfigLoader;

/// querybridge - natural-language questions over an MCP database tool server
#[derive(Parser)]
#[command(name = "querybridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ask your blockchain database questions in plain language")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file or directory path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provider to use (groq, openai, openai_compat, anthropic)
    #[arg(long)]
    protocol: Option<String>,

    /// API key override
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL override
    #[arg(long)]
    base_url: Option<String>,

    /// Model name override
    #[arg(long)]
    model: Option<String>,

    /// Number of conversation turns kept as context
    #[arg(long)]
    history_cap: Option<usize>,

    /// Command line that starts the MCP tool server
    #[arg(long)]
    server_command: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration, tool server connectivity and a sample tool call
    Test {
        /// Tool to call directly
        #[arg(long, default_value = "list_databases")]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Also send this question through the model
        #[arg(long)]
        ask: Option<String>,
    },

    /// Show available tools
    Tools,
}

/// Build a configuration loader from CLI arguments
fn build_config_loader(cli: &Cli) -> CliConfigLoader {
    let mut loader = CliConfigLoader::new();

    if let Some(config_path) = &cli.config {
        loader = loader.with_config_override(config_path.clone());
    }

    if let Some(protocol) = &cli.protocol {
        loader = loader.with_protocol_override(protocol.clone());
    }

    if let Some(api_key) = &cli.api_key {
        loader = loader.with_api_key_override(api_key.clone());
    }

    if let Some(base_url) = &cli.base_url {
        loader = loader.with_base_url_override(base_url.clone());
    }

    if let Some(model) = &cli.model {
        loader = loader.with_model_override(model.clone());
    }

    if let Some(history_cap) = cli.history_cap {
        loader = loader.with_history_cap_override(history_cap);
    }

    if let Some(command) = &cli.server_command {
        loader = loader.with_server_command_override(command.clone());
    }

    loader
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // A missing .env file is fine; a broken one is reported
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Could not fully read .env file: {}", e),
    }

    let config_loader = build_config_loader(&cli);

    match cli.command {
        Some(Commands::Test { tool, args, ask }) => {
            test_command(config_loader, tool, args, ask, cli.verbose).await
        }
        Some(Commands::Tools) => tools_command(config_loader).await,
        None => interactive_command(config_loader, cli.verbose).await,
    }
}
