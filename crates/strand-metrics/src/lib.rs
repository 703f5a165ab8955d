//! # strand-metrics
//!
//! Runtime instrumentation for the Strand job system and resource pipeline.
//!
//! Features:
//! - Counters (monotonic event counts)
//! - Gauges (current values such as ready-job backlog)
//! - Latency histograms with fixed microsecond buckets
//! - JSON snapshot export

#![warn(missing_docs)]
#![warn(clippy::all)]

mod histogram;
mod registry;
mod snapshot;

pub use histogram::{Histogram, LATENCY_BUCKETS_US};
pub use registry::Metrics;
pub use snapshot::{HistogramSummary, MetricsSnapshot};

/// Run a block and record its duration, in microseconds, under `$name`
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.observe($name, start.elapsed().as_micros() as u64);
        result
    }};
}
