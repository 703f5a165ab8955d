//! Configuration for strand-demo

use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strand_jobs::JobConfig;

/// Demo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Resource root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Disk I/O threads
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
    /// How long to wait for every entry to leave EMPTY
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Resources to load, relative to `root`
    #[serde(default)]
    pub entries: Vec<String>,
    /// Job manager settings
    #[serde(default)]
    pub jobs: JobConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from("./assets")
}

fn default_io_threads() -> usize {
    2
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            io_threads: default_io_threads(),
            timeout_ms: default_timeout_ms(),
            entries: Vec::new(),
            jobs: JobConfig::default(),
        }
    }
}

impl DemoConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, cli: &Cli) {
        if let Some(root) = &cli.root {
            self.root = root.clone();
        }
        if let Some(workers) = cli.workers {
            self.jobs.worker_count = workers;
        }
        if let Some(capacity) = cli.queue_capacity {
            self.jobs.queue_capacity = capacity;
        }
        if let Some(io_threads) = cli.io_threads {
            self.io_threads = io_threads;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if !cli.entries.is_empty() {
            self.entries = cli.entries.clone();
        }
    }

    /// Reject configurations the demo cannot run
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            bail!(
                "nothing to load: pass entries on the command line or set `entries` in the config"
            );
        }
        if self.io_threads == 0 {
            bail!("io_threads must be at least 1");
        }
        self.jobs.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = DemoConfig::default();
        assert_eq!(config.root, PathBuf::from("./assets"));
        assert_eq!(config.io_threads, 2);
        assert_eq!(config.timeout_ms, 5_000);
        assert!(config.entries.is_empty());
        assert_eq!(config.jobs, JobConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml = r#"
            root = "/srv/assets"
            entries = ["level.manifest"]

            [jobs]
            worker_count = 0
        "#;
        let config: DemoConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/assets"));
        assert_eq!(config.io_threads, 2);
        assert_eq!(config.entries, vec!["level.manifest"]);
        assert_eq!(config.jobs.worker_count, 0);
        assert_eq!(config.jobs.queue_capacity, JobConfig::default().queue_capacity);
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"timeout_ms = 100\nentries = [\"a.blob\"]\n").unwrap();

        let config = DemoConfig::load(file.path()).unwrap();
        assert_eq!(config.timeout_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_rejects_bad_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"timeout_ms = \"soon\"").unwrap();
        assert!(DemoConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = DemoConfig {
            entries: vec!["from-config.blob".to_string()],
            ..DemoConfig::default()
        };
        let cli = Cli::parse_from([
            "strand-demo",
            "--workers",
            "3",
            "--root",
            "/data",
            "x.manifest",
        ]);
        config.apply(&cli);

        assert_eq!(config.jobs.worker_count, 3);
        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.entries, vec!["x.manifest"]);
        assert_eq!(config.io_threads, 2);
    }

    #[test]
    fn test_validate() {
        assert!(DemoConfig::default().validate().is_err());

        let mut config = DemoConfig {
            entries: vec!["a.blob".to_string()],
            ..DemoConfig::default()
        };
        assert!(config.validate().is_ok());
        config.jobs.queue_capacity = 6;
        assert!(config.validate().is_err());
        config.jobs.queue_capacity = 8;
        config.io_threads = 0;
        assert!(config.validate().is_err());
    }
}
