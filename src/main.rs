//! telemetry-forest - Main Entry Point
//!
//! Trains and exports isolation forest bundles for telemetry anomaly detection.

use clap::Parser;
use telemetry_forest::cli::{cmd_info, cmd_score, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "telemetry_forest=debug"
    } else {
        "telemetry_forest=info"
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Train(args) => {
            cmd_train(&args)?;
        }
        Commands::Score {
            bundle,
            features,
            values,
        } => {
            cmd_score(&bundle, features.as_deref(), &values)?;
        }
        Commands::Info { bundle } => {
            cmd_info(&bundle)?;
        }
    }

    Ok(())
}
