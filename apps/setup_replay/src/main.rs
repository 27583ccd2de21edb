use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod config;
mod scenario;

use config::load_settings;
use scenario::{replay, Scenario};

/// Replays a scripted cluster setup session through the console core.
#[derive(Parser, Debug)]
struct Cli {
    /// Scenario file describing backend answers and operator input.
    #[arg(long)]
    scenario: PathBuf,
    /// Console settings; `console.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let script = Scenario::from_file(&cli.scenario)?;
    info!(?settings, scenario = %cli.scenario.display(), "replaying setup scenario");

    let summary = replay(script, settings.timings(), settings.routes()).await?;
    println!("{summary}");
    Ok(())
}
