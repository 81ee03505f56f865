//! FP Store CLI - operator front end for the feature-profile store.
//!
//! This binary wraps the fp-store-core library: it loads settings, installs
//! logging, runs one command and prints the result as JSON on stdout.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use fp_store_core::{FeatureProfileStore, Settings, StoreError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "fp-store")]
#[command(about = "Feature profile store for time-series anomaly windows")]
struct Args {
    /// Settings file (JSON); missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory holding data/, features_profiles/ and the catalog
    #[arg(long)]
    root: Option<PathBuf>,

    /// Create missing data, profiles and database directories
    #[arg(long)]
    init: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    if let Some(path) = &args.config {
        return Settings::load(path).with_context(|| format!("Loading settings from {}", path.display()));
    }
    let root = match &args.root {
        Some(root) => root.clone(),
        None => dirs::data_dir()
            .map(|dir| dir.join("fp-store"))
            .context("No --root given and no platform data directory available")?,
    };
    Ok(Settings::rooted_at(root))
}

async fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    info!("Catalog: {}", settings.database_path.display());

    let store = FeatureProfileStore::builder(settings)
        .auto_create_dirs(args.init)
        .build()
        .await?;

    let output = commands::execute(&store, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e.downcast_ref::<StoreError>().map(StoreError::exit_code).unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
