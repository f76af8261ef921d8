use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use warmachine::adapters::{build_notifier, SimulatedMarketData};
use warmachine::cli::orders::{self, OrderEntry};
use warmachine::cli::output::OutputMode;
use warmachine::cli::{Cli, Commands};
use warmachine::config::AppConfig;
use warmachine::platform::ExecutionEngine;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = OutputMode::from_json_flag(cli.json);

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    match cli.command {
        Commands::ShowConfig => {
            init_logging_simple();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run { orders: Some(path) } => {
            init_logging(&config.logging);
            let entries = orders::load_batch(&path)
                .with_context(|| format!("reading orders from {}", path.display()))?;
            info!(count = entries.len(), file = %path.display(), "Loaded order batch");
            let engine = build_engine(&config)?;
            orders::run_batch(&engine, entries, mode).await?;
        }
        Commands::Run { orders: None } => {
            init_logging(&config.logging);
            info!("Reading orders from stdin, one JSON object per line");
            let engine = build_engine(&config)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            orders::run_stream(&engine, stdin, shutdown_signal(), mode).await?;
        }
        Commands::Order(args) => {
            init_logging(&config.logging);
            let entry: OrderEntry = args.into_entry();
            let engine = build_engine(&config)?;
            orders::run_batch(&engine, vec![entry], mode).await?;
        }
    }

    Ok(())
}

fn build_engine(config: &AppConfig) -> anyhow::Result<ExecutionEngine> {
    let market_data = Arc::new(SimulatedMarketData::from_config(&config.market_data));
    let notifier = build_notifier(&config.notification)?;
    Ok(ExecutionEngine::new(config, market_data, notifier)?)
}

