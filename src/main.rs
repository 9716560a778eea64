use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use pulse::commands::{backtest, export_features, serve, train};
use pulse::config::ServiceConfig;
use pulse::context::AppContext;
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Personal trading-signal service for Bitcoin and Gold")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the periodic signal updater
    Serve {
        /// Listen port (falls back to PORT, then 5000)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Download history, compute features and train all models
    Train,
    /// Grid-search the trade simulator and persist the best run per asset
    Backtest {
        /// Entry thresholds in percent (comma separated)
        #[arg(long = "entry-thresholds", value_delimiter = ',', num_args = 1..)]
        entry_thresholds: Vec<f64>,
        /// Stop-loss ATR multipliers (comma separated)
        #[arg(long = "sl-multipliers", value_delimiter = ',', num_args = 1..)]
        sl_multipliers: Vec<f64>,
    },
    /// Write per-asset feature CSVs
    ExportFeatures {
        /// Destination directory (defaults to the working directory)
        #[arg(short, long = "output", value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let database_url = env::var("DATABASE_URL").ok();
    if database_url.is_none() && command_requires_database(&command) {
        return Err(anyhow!("DATABASE_URL must be set for this command."));
    }
    let config = ServiceConfig::from_env();
    let app_context = AppContext::initialize(database_url, config).await?;

    info!("Starting pulse. Not financial advice; use at your own risk.");

    match command {
        Commands::Serve { port } => {
            serve::run(&app_context, port).await?;
        }
        Commands::Train => {
            train::run(&app_context).await?;
        }
        Commands::Backtest {
            entry_thresholds,
            sl_multipliers,
        } => {
            backtest::run(&app_context, &entry_thresholds, &sl_multipliers).await?;
        }
        Commands::ExportFeatures { output } => {
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            export_features::run(&output_dir).await?;
        }
    }

    Ok(())
}

fn command_requires_database(command: &Commands) -> bool {
    !matches!(command, Commands::ExportFeatures { .. })
}
