//! CLI argument parsing for strand-demo

use clap::Parser;
use std::path::PathBuf;

/// Load resources from a directory through the Strand job system
#[derive(Parser, Debug, Clone)]
#[command(name = "strand-demo")]
#[command(about = "Load a directory of resources through the Strand job system")]
#[command(version)]
pub struct Cli {
    /// Resources to load, relative to the root (overrides the config's entries)
    pub entries: Vec<String>,

    /// Resource root directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads (0 runs jobs inline)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Transaction slots per worker queue (power of two)
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Disk I/O threads
    #[arg(long)]
    pub io_threads: Option<usize>,

    /// Stop waiting for resources after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print the report and metrics as JSON
    #[arg(long)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["strand-demo"]);
        assert!(cli.entries.is_empty());
        assert!(cli.root.is_none());
        assert!(cli.config.is_none());
        assert!(cli.workers.is_none());
        assert!(!cli.json);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_custom_values() {
        let cli = Cli::parse_from([
            "strand-demo",
            "--root", "/tmp/assets",
            "--config", "demo.toml",
            "--workers", "0",
            "--queue-capacity", "16",
            "--io-threads", "3",
            "--timeout-ms", "250",
            "--json",
            "--log-level", "debug",
            "level.manifest",
            "logo.png",
        ]);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/assets")));
        assert_eq!(cli.config, Some(PathBuf::from("demo.toml")));
        assert_eq!(cli.workers, Some(0));
        assert_eq!(cli.queue_capacity, Some(16));
        assert_eq!(cli.io_threads, Some(3));
        assert_eq!(cli.timeout_ms, Some(250));
        assert!(cli.json);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.entries, vec!["level.manifest", "logo.png"]);
    }
}
