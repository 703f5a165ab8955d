//! Strand demo binary
//!
//! Loads resources from a directory through the job system and the resource
//! hub, then reports how each one settled.
//!
//! ```bash
//! strand-demo --root ./assets level.manifest logo.png
//! strand-demo --config demo.toml --workers 0 --json
//! ```

mod cli;
mod config;
mod formats;
mod runner;

use anyhow::{bail, Result};
use cli::Cli;
use config::DemoConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    config.apply(&cli);
    config.validate()?;

    let report = runner::run(&config)?;
    report.print(cli.json)?;

    if !report.settled {
        bail!("resources did not settle within {} ms", config.timeout_ms);
    }
    let failed = report.failed();
    if failed > 0 {
        bail!("{} of {} resources failed to load", failed, report.entries.len());
    }
    Ok(())
}
