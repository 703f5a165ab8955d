//! Load the configured entries and report how they settled

use crate::config::DemoConfig;
use crate::formats::{type_name_for, Formats, Manifest};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_jobs::JobManager;
use strand_metrics::{Metrics, MetricsSnapshot};
use strand_resource::{DiskFileSystem, Resource, ResourceHub, ResourceState};

/// Outcome of one entry
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    /// Path as given
    pub path: String,
    /// Resource type name
    pub kind: &'static str,
    /// Display name set by a manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// State when the run ended
    pub state: ResourceState,
    /// Bytes read for the entry itself
    pub size: u64,
    /// Dependencies loaded by the entry
    pub dependencies: usize,
    /// Error recorded on the entry, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryReport {
    fn capture(path: &str, resource: &Resource) -> Self {
        Self {
            path: path.to_string(),
            kind: type_name_for(path),
            title: resource
                .with_body(|manifest: &Manifest| manifest.name.clone())
                .flatten(),
            state: resource.state(),
            size: resource.size(),
            dependencies: resource.dependencies().len(),
            error: resource.last_error().map(|err| err.to_string()),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Per-entry outcomes, in configuration order
    pub entries: Vec<EntryReport>,
    /// Whether every entry left EMPTY before the timeout
    pub settled: bool,
    /// Wall time until settling or timing out
    pub elapsed_ms: u64,
    /// Job and resource metrics
    pub metrics: MetricsSnapshot,
}

impl Report {
    /// Entries that ended in FAILURE
    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state == ResourceState::Failure)
            .count()
    }

    /// Print as a table, or as JSON
    pub fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        for entry in &self.entries {
            print!(
                "{:<8} {:<9} {:>10} B  {:>3} deps  {}",
                entry.state.as_str(), entry.kind, entry.size, entry.dependencies, entry.path
            );
            match &entry.error {
                Some(error) => println!("  ({error})"),
                None => match &entry.title {
                    Some(title) => println!("  [{title}]"),
                    None => println!(),
                },
            }
        }
        println!(
            "{} entries, {} failed, {} in {} ms",
            self.entries.len(),
            self.failed(),
            if self.settled { "settled" } else { "timed out" },
            self.elapsed_ms
        );
        Ok(())
    }
}

/// Load every entry of `config` from disk and wait for it to settle
pub fn run(config: &DemoConfig) -> Result<Report> {
    let metrics = Arc::new(Metrics::new());
    let jobs = Arc::new(JobManager::with_metrics(config.jobs.clone(), Arc::clone(&metrics))?);
    let fs = Arc::new(DiskFileSystem::new(&config.root, config.io_threads)?);
    let hub = ResourceHub::with_jobs(fs, Arc::clone(&jobs));
    let formats = Formats::register(&hub)?;
    tracing::info!(
        "Loading {} entries from {} with {} workers",
        config.entries.len(),
        config.root.display(),
        jobs.worker_count()
    );

    let (settle_tx, settle_rx) = crossbeam_channel::unbounded();
    let start = Instant::now();
    let mut loaded = Vec::with_capacity(config.entries.len());
    for path in &config.entries {
        let resource = hub.load(formats.type_for(path), path)?;
        let tx = settle_tx.clone();
        let observer = resource.observe(move |_, new, _| {
            if new != ResourceState::Empty {
                let _ = tx.send(());
            }
        });
        loaded.push((path.as_str(), resource, observer));
    }

    let deadline = start + Duration::from_millis(config.timeout_ms);
    let settled = loop {
        if loaded.iter().all(|(_, resource, _)| !resource.is_empty()) {
            break true;
        }
        let now = Instant::now();
        if now >= deadline {
            break false;
        }
        let _ = settle_rx.recv_timeout((deadline - now).min(Duration::from_millis(50)));
    };
    let elapsed = start.elapsed();
    metrics.observe("demo.settle_us", elapsed.as_micros() as u64);
    if !settled {
        tracing::warn!("Timed out after {:?} waiting for resources", elapsed);
    }

    let entries = loaded
        .iter()
        .map(|(path, resource, _)| EntryReport::capture(path, resource))
        .collect();

    for (_, resource, observer) in &loaded {
        resource.unobserve(*observer);
        hub.unload(resource);
    }
    let purged = hub.purge();
    tracing::debug!("Purged {} resources", purged);
    jobs.shutdown();
    hub.shutdown();

    Ok(Report {
        entries,
        settled,
        elapsed_ms: elapsed.as_millis() as u64,
        metrics: MetricsSnapshot::capture(&metrics),
    })
}
