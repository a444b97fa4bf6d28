#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use cadence::{Cadence, Engine};
use cadence_common::{audit, internal, logging};
use clap::Parser;

/// Run the cadence sequencer
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Outbound sequencer and campaign execution engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, overriding the usual search locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.map_or_else(find_config_file, Ok)?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let config = Cadence::from_ron(&config_content)?;

    logging::init();
    audit::init(config.audit.clone());

    let engine = Engine::build(config).await?;

    if cli.once {
        let report = engine.tick_once().await;
        internal!(level = INFO, "Tick finished: {report:?}");
        return Ok(());
    }

    engine.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `CADENCE_CONFIG` environment variable
/// 2. ./cadence.config.ron (current working directory)
/// 3. /etc/cadence/cadence.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("CADENCE_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "CADENCE_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = vec![
        PathBuf::from("./cadence.config.ron"),
        PathBuf::from("/etc/cadence/cadence.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - CADENCE_CONFIG environment variable\n{paths_tried}"
    )
}
