//! Mergewarden — automated review feedback for pull requests and CI
//! failures.
//!
//! Listens for hosting-service webhooks, fans each event out into
//! staggered analysis pipelines (review, documentation, quality, CI
//! triage), consults a language model with bounded rate-limit retry,
//! optionally commits a narrowly-scoped automatic fix, and posts the
//! results back to the originating pull request.

mod analysis;
mod config;
mod dispatch;
mod gateway;
mod github;
mod providers;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "mergewarden", version, about = "Automated AI review feedback for pull requests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook gateway.
    Serve {
        /// Bind host (overrides the config file).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Path to a TOML config file.
        #[arg(long, default_value = "mergewarden.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { host, port, config } => {
            let mut config = Config::load(Some(&config))?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            gateway::run_gateway(config).await
        }
    }
}
