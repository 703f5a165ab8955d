//! Named metric registry

use crate::Histogram;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe store of named counters, gauges and histograms
///
/// Lookups take the read lock; the write lock is only taken the first time a
/// name is seen.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<&'static str, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<&'static str, Arc<AtomicI64>>>,
    histograms: RwLock<HashMap<&'static str, Arc<Histogram>>>,
}

fn get_or_insert<V>(
    map: &RwLock<HashMap<&'static str, Arc<V>>>,
    name: &'static str,
    make: impl FnOnce() -> V,
) -> Arc<V> {
    if let Some(existing) = map.read().get(name) {
        return Arc::clone(existing);
    }
    Arc::clone(map.write().entry(name).or_insert_with(|| Arc::new(make())))
}

impl Metrics {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to a counter
    pub fn incr(&self, name: &'static str, delta: u64) {
        get_or_insert(&self.counters, name, || AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge
    pub fn set_gauge(&self, name: &'static str, value: i64) {
        get_or_insert(&self.gauges, name, || AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    /// Add `delta` (possibly negative) to a gauge
    pub fn add_gauge(&self, name: &'static str, delta: i64) {
        get_or_insert(&self.gauges, name, || AtomicI64::new(0)).fetch_add(delta, Ordering::Relaxed);
    }

    /// Record a histogram observation
    pub fn observe(&self, name: &'static str, value: u64) {
        get_or_insert(&self.histograms, name, Histogram::new).observe(value);
    }

    /// Current counter value
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Current gauge value
    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Shared handle to a histogram
    pub fn histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        self.histograms.read().get(name).cloned()
    }

    pub(crate) fn counters(&self) -> Vec<(&'static str, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn gauges(&self) -> Vec<(&'static str, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn histograms(&self) -> Vec<(&'static str, Arc<Histogram>)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (*k, Arc::clone(v)))
            .collect()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("counters", &self.counters.read().len())
            .field("gauges", &self.gauges.read().len())
            .field("histograms", &self.histograms.read().len())
            .finish()
    }
}
