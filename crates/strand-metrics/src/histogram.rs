//! Fixed-bucket latency histogram

use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bounds, in microseconds, of the default latency buckets
pub const LATENCY_BUCKETS_US: [u64; 10] = [
    5, 20, 50, 100, 250, 1_000, 5_000, 20_000, 100_000, 1_000_000,
];

/// Latency histogram
///
/// One extra overflow bucket collects observations above the last bound.
pub struct Histogram {
    bounds: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Create a histogram with [`LATENCY_BUCKETS_US`]
    pub fn new() -> Self {
        Self::with_bounds(LATENCY_BUCKETS_US.to_vec())
    }

    /// Create a histogram with custom, ascending bucket bounds
    pub fn with_bounds(bounds: Vec<u64>) -> Self {
        debug_assert!(bounds.windows(2).all(|w| w[0] < w[1]));
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record one observation
    pub fn observe(&self, value: u64) {
        let index = self.bounds.partition_point(|bound| *bound < value);
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean of all observations, 0 when empty
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Largest observation
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Per-bucket counts; the last entry is the overflow bucket
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_selection() {
        let h = Histogram::with_bounds(vec![10, 100]);
        h.observe(10);
        h.observe(11);
        h.observe(1000);
        assert_eq!(h.bucket_counts(), vec![1, 1, 1]);
        assert_eq!(h.count(), 3);
        assert_eq!(h.max(), 1000);
    }

    #[test]
    fn test_mean() {
        let h = Histogram::new();
        assert_eq!(h.mean(), 0.0);
        h.observe(100);
        h.observe(300);
        assert_eq!(h.mean(), 200.0);
    }
}
