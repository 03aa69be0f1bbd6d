//! Main entry point for the hybridpack CLI application.
//!
//! Parses the command line, sets up logging, and runs the protection
//! pipeline once.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hybridpack::{Cli, Pipeline};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v / -q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str().to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.to_config().context("invalid arguments")?;
    let transform = cli.transform().context("transform tool unavailable")?;
    let input = config.input.clone();

    let outcome = Pipeline::new(config, transform)
        .run()
        .await
        .with_context(|| format!("protecting {}", input.display()))?;

    info!("Done: {}", outcome.output.display());
    for file in &outcome.mapping_files {
        info!("Guard mapping: {}", file.display());
    }
    Ok(())
}
