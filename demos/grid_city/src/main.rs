//! grid_city — runs the traffic coordination engine on a synthetic grid.
//!
//! ```text
//! grid_city [CONFIG.json] [SECONDS]
//! ```
//!
//! Without a config file the defaults apply: a 20×20 grid with lights on
//! every 4th row and column, 10 cars, 5 ambulances and three hospitals.
//! Any field missing from the file keeps its default.  Log verbosity follows
//! `RUST_LOG` (default `info`); the metrics summary is printed as JSON.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tm_core::SimConfig;
use tm_sim::SimBuilder;

const DEFAULT_SECS: u64 = 60;

fn load_config(path: &Path) -> Result<SimConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => load_config(Path::new(&path))?,
        None => SimConfig::default(),
    };
    let secs = match args.next() {
        Some(s) => s.parse::<u64>().with_context(|| format!("bad duration {s:?}"))?,
        None => DEFAULT_SECS,
    };

    info!(seed = config.seed, secs, "starting grid_city");
    let sim = SimBuilder::new(config).build()?;
    let summary = sim.run(Duration::from_secs(secs)).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
