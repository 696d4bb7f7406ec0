//! fleetcheck CLI
//!
//! Reports which fleet nodes are reachable and which deployment targets run
//! the image recorded by the last build

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod progress;
mod render;
mod status;

use config::Config;
use status::StatusArgs;

#[derive(Parser, Debug)]
#[command(name = "fleetcheck", version, about = "Fleet deployment status", long_about = None)]
struct Cli {
    /// Directory holding fleet.toml and fleet.lock
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show node reachability and deployment status
    #[command(name = "status")]
    Status(StatusArgs),
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let (config, config_path) = Config::load_default()?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_tracing(level, cli.log_json);
    debug!(config = ?config_path, "configuration loaded");

    let base_dir = config::resolve_base_dir(cli.base_dir)?;

    match cli.command {
        Commands::Status(args) => status::run(&base_dir, config, args).await,
    }
}
