//! namerouter
//!
//! # Architecture Overview
//!
//! ```text
//!   :80  (http)   bind-route → rate-limit → source-port → host-header
//!                   → [https-redirect] → auth-gate ─────┐
//!                                                        ├──▶ dispatch ──▶ upstream
//!   :443 (https)  rate-limit → host-header ─────────────┘
//!
//!   :9000 (health) any request → 200 OK
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use namerouter::config::load_config;
use namerouter::lifecycle::termination;
use namerouter::observability::{logging, metrics};
use namerouter::{EdgeError, EdgeServer};

#[derive(Parser)]
#[command(name = "namerouter")]
#[command(about = "Name-based virtual host edge router", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router
    Run {
        /// Configuration file (YAML, or TOML by extension)
        #[arg(long, env = "NAMEROUTER_CONFIG_FILE")]
        config_file: PathBuf,

        /// Verbose console logging
        #[arg(long, env = "NAMEROUTER_DEBUG")]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config_file, debug } => run(config_file, debug).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "namerouter failed");
            eprintln!("namerouter: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_file: PathBuf, debug: bool) -> Result<(), EdgeError> {
    let mut config = load_config(&config_file)?;
    config.debug |= debug;

    logging::init(config.debug);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_file.display(),
        routes = config.routes.len(),
        do_ssl = config.do_ssl,
        "namerouter starting"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let running = EdgeServer::new(config)?.start().await?;
    running.run_until(termination(), grace).await
}
