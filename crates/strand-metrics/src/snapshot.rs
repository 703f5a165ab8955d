//! Point-in-time metric export

use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of every metric in a [`Metrics`] registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of one histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Number of observations
    pub count: u64,
    /// Mean observation
    pub mean: f64,
    /// Largest observation
    pub max: u64,
}

impl MetricsSnapshot {
    /// Capture the current state of `metrics`
    pub fn capture(metrics: &Metrics) -> Self {
        Self {
            counters: metrics
                .counters()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            gauges: metrics
                .gauges()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            histograms: metrics
                .histograms()
                .into_iter()
                .map(|(k, h)| {
                    let summary = HistogramSummary {
                        count: h.count(),
                        mean: h.mean(),
                        max: h.max(),
                    };
                    (k.to_string(), summary)
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
