//! Job manager implementation
//!
//! Entries live in a generational arena. An entry whose dependency count
//! reaches zero goes onto a priority heap of ready jobs; `do_scheduling`
//! moves ready jobs into the workers' transaction queues round-robin.

use crate::config::JobConfig;
use crate::entry::{EntryId, EntryKind, EntryNode, JobOptions};
use crate::error::{JobError, JobResult};
use crate::payload::{FnJob, JobPayload};
use crate::worker;
use parking_lot::Mutex;
use slotmap::SlotMap;
use std::borrow::Cow;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use strand_metrics::{timed, Metrics};
use strand_queue::{QueueError, TransactionQueue};
use strand_sync::Event;

/// A job waiting for a queue slot
#[derive(Debug, PartialEq, Eq)]
struct ReadyJob {
    priority: crate::JobPriority,
    seq: u64,
    id: EntryId,
}

impl Ord for ReadyJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Highest priority first, then oldest first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Outcome of handing one job to the worker queues
enum Dispatch {
    Sent,
    Full,
    Closed,
}

/// State shared between the manager handle, workers and the scheduler thread
pub(crate) struct Shared {
    pub(crate) config: JobConfig,
    entries: Mutex<SlotMap<EntryId, Arc<EntryNode>>>,
    ready: Mutex<BinaryHeap<ReadyJob>>,
    ready_seq: AtomicU64,
    pub(crate) queues: Vec<TransactionQueue<EntryId>>,
    next_queue: AtomicUsize,
    pub(crate) scheduler_signal: Event,
    pub(crate) stopping: AtomicBool,
    draining: AtomicBool,
    pub(crate) metrics: Arc<Metrics>,
}

impl Shared {
    fn new(config: JobConfig, metrics: Arc<Metrics>) -> Self {
        let queues = (0..config.worker_count)
            .map(|_| TransactionQueue::new(config.queue_capacity))
            .collect();
        Self {
            config,
            entries: Mutex::new(SlotMap::with_key()),
            ready: Mutex::new(BinaryHeap::new()),
            ready_seq: AtomicU64::new(0),
            queues,
            next_queue: AtomicUsize::new(0),
            scheduler_signal: Event::auto(),
            stopping: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            metrics,
        }
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn lookup(&self, id: EntryId) -> JobResult<Arc<EntryNode>> {
        self.entries
            .lock()
            .get(id)
            .cloned()
            .ok_or(JobError::StaleHandle(id))
    }

    fn insert(&self, node: EntryNode) -> EntryId {
        self.entries.lock().insert(Arc::new(node))
    }

    /// Route an entry whose dependency count just reached zero
    fn on_ready(&self, id: EntryId, node: Arc<EntryNode>) {
        if node.job_state().is_some() {
            self.push_ready(id, &node);
        } else {
            self.fire(id, node);
        }
    }

    fn push_ready(&self, id: EntryId, node: &EntryNode) {
        let Some(state) = node.job_state() else {
            return;
        };
        let seq = self.ready_seq.fetch_add(1, Ordering::Relaxed);
        self.ready.lock().push(ReadyJob {
            priority: state.priority,
            seq,
            id,
        });
        self.metrics.add_gauge("jobs.ready", 1);
        tracing::trace!("Job '{}' is ready", state.name);
    }

    /// Notify dependents of a finished entry and signal its completion
    ///
    /// Auto-destroyed jobs leave the arena before any dependent can observe
    /// them. Sync points reached along the way fire in the same pass, without
    /// recursion.
    pub(crate) fn fire(&self, id: EntryId, node: Arc<EntryNode>) {
        let mut pending = vec![(id, node)];
        while let Some((id, node)) = pending.pop() {
            if node.job_state().is_some_and(|state| state.auto_destroy) {
                self.entries.lock().remove(id);
            }
            for dependent_id in node.take_dependents() {
                let dependent = match self.lookup(dependent_id) {
                    Ok(dependent) => dependent,
                    Err(_) => {
                        tracing::warn!(
                            "Dependent of '{}' was destroyed before it became ready",
                            node.name()
                        );
                        continue;
                    }
                };
                if dependent.decrement_dependency() {
                    if matches!(dependent.kind, EntryKind::SyncPoint) {
                        pending.push((dependent_id, dependent));
                    } else {
                        self.push_ready(dependent_id, &dependent);
                    }
                }
            }

            node.signal_completion();
        }
    }

    /// Run a popped job's payload
    ///
    /// Returns the node so the caller can fire it once the transaction is
    /// completed, or `None` if the entry vanished.
    pub(crate) fn execute(&self, id: EntryId) -> Option<Arc<EntryNode>> {
        let node = match self.lookup(id) {
            Ok(node) => node,
            Err(_) => {
                tracing::warn!("Dropping queued job {:?}: entry was destroyed", id);
                return None;
            }
        };
        let state = node.job_state()?;
        let payload = state.payload.lock().take();
        let Some(mut payload) = payload else {
            panic!("job '{}' executed twice", state.name);
        };

        let outcome = timed!(self.metrics, "jobs.execute_us", {
            panic::catch_unwind(AssertUnwindSafe(|| payload.execute()))
        });
        if outcome.is_err() {
            tracing::error!("Job '{}' panicked", state.name);
            self.metrics.incr("jobs.panicked", 1);
        }
        drop(payload);

        state.executed.store(true, Ordering::Release);
        self.metrics.incr("jobs.executed", 1);
        Some(node)
    }

    /// Execute and fire a job on the current thread
    fn run_inline(&self, id: EntryId) {
        if let Some(node) = self.execute(id) {
            self.fire(id, node);
        }
    }

    /// Move ready jobs into the worker queues
    ///
    /// Non-blocking callers stop at the first full round and leave the rest
    /// to the scheduler thread. With no workers the heap is drained inline.
    pub(crate) fn do_scheduling(&self, blocking: bool) {
        if self.queues.is_empty() {
            self.drain_inline();
            return;
        }

        loop {
            let next = self.ready.lock().pop();
            let Some(job) = next else {
                break;
            };
            match self.dispatch(job.id, blocking) {
                Dispatch::Sent => self.metrics.add_gauge("jobs.ready", -1),
                Dispatch::Full => {
                    self.ready.lock().push(job);
                    self.scheduler_signal.set();
                    break;
                }
                Dispatch::Closed => {
                    self.ready.lock().push(job);
                    break;
                }
            }
        }
    }

    fn dispatch(&self, id: EntryId, blocking: bool) -> Dispatch {
        let count = self.queues.len();
        let start = self.next_queue.fetch_add(1, Ordering::Relaxed) % count;
        for offset in 0..count {
            match self.queues[(start + offset) % count].push(id, false) {
                Ok(_) => return Dispatch::Sent,
                Err(QueueError::WouldBlock) => continue,
                Err(QueueError::Aborted) => return Dispatch::Closed,
            }
        }
        if !blocking {
            return Dispatch::Full;
        }
        match self.queues[start].push(id, true) {
            Ok(_) => Dispatch::Sent,
            Err(_) => Dispatch::Closed,
        }
    }

    /// Zero-worker mode: run ready jobs on this thread until none remain
    ///
    /// Jobs made ready while draining are picked up by the same loop, so a
    /// job that schedules another from its payload does not recurse.
    fn drain_inline(&self) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let next = self.ready.lock().pop();
            match next {
                Some(job) => {
                    self.metrics.add_gauge("jobs.ready", -1);
                    self.run_inline(job.id);
                }
                None => {
                    self.draining.store(false, Ordering::Release);
                    // Another thread may have pushed between the pop and the store.
                    if self.ready.lock().is_empty() || self.draining.swap(true, Ordering::AcqRel) {
                        break;
                    }
                }
            }
        }
    }
}

/// Dependency-graph job scheduler
///
/// Jobs and sync points are created unscheduled with a dependency count of
/// one. [`add_dependency`](Self::add_dependency) adds prerequisite edges and
/// [`schedule`](Self::schedule) releases the owner's hold; a job runs once
/// every prerequisite has fired and it has been scheduled.
///
/// With `worker_count == 0` no threads are started and jobs run inline on the
/// thread that makes them ready.
pub struct JobManager {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl JobManager {
    /// Start a manager with its own metrics registry
    pub fn new(config: JobConfig) -> JobResult<Self> {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    /// Start a manager reporting into `metrics`
    pub fn with_metrics(config: JobConfig, metrics: Arc<Metrics>) -> JobResult<Self> {
        config.validate()?;
        let worker_count = config.worker_count;
        let prefix = config.thread_name_prefix.clone();
        let manager = Self {
            shared: Arc::new(Shared::new(config, metrics)),
            threads: Mutex::new(Vec::with_capacity(worker_count + 1)),
        };

        // On a spawn failure `manager` is dropped, which joins what was started.
        for index in 0..worker_count {
            let shared = Arc::clone(&manager.shared);
            let handle = thread::Builder::new()
                .name(format!("{prefix}-worker-{index}"))
                .spawn(move || worker::run_worker(shared, index))?;
            manager.threads.lock().push(handle);
        }
        if worker_count > 0 {
            let shared = Arc::clone(&manager.shared);
            let handle = thread::Builder::new()
                .name(format!("{prefix}-scheduler"))
                .spawn(move || worker::run_scheduler(shared))?;
            manager.threads.lock().push(handle);
        }

        if worker_count == 0 {
            tracing::info!("Job manager started in inline mode");
        } else {
            tracing::info!("Job manager started with {} workers", worker_count);
        }
        Ok(manager)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Configuration the manager was started with
    pub fn config(&self) -> &JobConfig {
        &self.shared.config
    }

    /// Metrics registry
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Create an unscheduled job
    ///
    /// # Panics
    ///
    /// Panics if `options` asks for both `auto_destroy` and `sync`: an entry
    /// that destroys itself cannot be joined.
    pub fn create_job<P: JobPayload>(&self, payload: P, options: JobOptions) -> JobResult<EntryId> {
        self.create_boxed_job(Box::new(payload), options)
    }

    /// Create an unscheduled job from a boxed payload
    pub fn create_boxed_job(
        &self,
        payload: Box<dyn JobPayload>,
        options: JobOptions,
    ) -> JobResult<EntryId> {
        assert!(
            !(options.auto_destroy && options.sync),
            "job '{}' cannot be both auto-destroyed and synced",
            payload.name()
        );
        if self.shared.is_stopping() {
            return Err(JobError::ShutDown);
        }
        let id = self.shared.insert(EntryNode::job(payload, options));
        self.shared.metrics.incr("jobs.created", 1);
        Ok(id)
    }

    /// Create an unscheduled job running `func`
    pub fn create_fn_job<F>(
        &self,
        name: impl Into<Cow<'static, str>>,
        func: F,
        options: JobOptions,
    ) -> JobResult<EntryId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.create_job(FnJob::new(name, func), options)
    }

    /// Create a sync point: an entry with no payload that fires as soon as all
    /// its prerequisites have fired and it has been scheduled
    pub fn create_sync_point(&self) -> JobResult<EntryId> {
        if self.shared.is_stopping() {
            return Err(JobError::ShutDown);
        }
        Ok(self.shared.insert(EntryNode::sync_point()))
    }

    /// Make `dependent` wait for `prerequisite`
    ///
    /// Returns `false` when the prerequisite is already ready or fired; the
    /// edge is then ignored and the dependent does not wait for it.
    ///
    /// # Panics
    ///
    /// Panics if `dependent` is already ready.
    pub fn add_dependency(&self, prerequisite: EntryId, dependent: EntryId) -> JobResult<bool> {
        let prerequisite_node = self.shared.lookup(prerequisite)?;
        let dependent_node = self.shared.lookup(dependent)?;
        let added = prerequisite_node.add_dependent(dependent, &dependent_node);
        if !added {
            tracing::debug!(
                "Ignoring edge '{}' -> '{}': prerequisite already ready",
                prerequisite_node.name(),
                dependent_node.name()
            );
        }
        Ok(added)
    }

    /// Release the owner's hold on an entry
    ///
    /// If no prerequisites are pending the job becomes ready and is
    /// dispatched; a sync point fires immediately.
    ///
    /// # Panics
    ///
    /// Panics if the entry was already scheduled.
    pub fn schedule(&self, id: EntryId) -> JobResult<()> {
        if self.shared.is_stopping() {
            return Err(JobError::ShutDown);
        }
        let node = self.shared.lookup(id)?;
        node.mark_scheduled();
        if node.decrement_dependency() {
            self.shared.on_ready(id, node);
            self.shared.do_scheduling(!worker::on_worker_thread());
        }
        Ok(())
    }

    /// Dispatch ready jobs waiting for queue space
    pub fn do_scheduling(&self) {
        self.shared.do_scheduling(false);
    }

    /// Block until the entry has fired
    ///
    /// # Panics
    ///
    /// Panics if the entry was created without `sync`.
    pub fn sync(&self, id: EntryId) -> JobResult<()> {
        let node = self.shared.lookup(id)?;
        node.wait();
        Ok(())
    }

    /// Remove an entry from the arena
    ///
    /// A job already queued is skipped when a worker reaches it; dependents
    /// still waiting on the entry never become ready.
    pub fn destroy(&self, id: EntryId) -> JobResult<()> {
        self.shared
            .entries
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or(JobError::StaleHandle(id))
    }

    /// Whether `id` still refers to a live entry
    pub fn contains(&self, id: EntryId) -> bool {
        self.shared.entries.lock().contains_key(id)
    }

    /// Number of live entries
    pub fn entry_count(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Whether the entry has been scheduled by its owner
    pub fn is_scheduled(&self, id: EntryId) -> JobResult<bool> {
        Ok(self.shared.lookup(id)?.is_scheduled())
    }

    /// Whether the entry has finished: payload executed for a job, fired for a
    /// sync point
    pub fn is_executed(&self, id: EntryId) -> JobResult<bool> {
        let node = self.shared.lookup(id)?;
        Ok(match node.job_state() {
            Some(state) => state.executed.load(Ordering::Acquire),
            None => node.has_fired(),
        })
    }

    /// Current dependency count of an entry
    pub fn dependency_count(&self, id: EntryId) -> JobResult<i32> {
        Ok(self.shared.lookup(id)?.dependency_count())
    }

    /// Number of ready jobs not yet handed to a worker
    pub fn pending_ready(&self) -> usize {
        self.shared.ready.lock().len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_stopping()
    }

    /// Stop every thread and release all entries
    ///
    /// Idempotent. Jobs still queued or waiting in the ready heap are dropped
    /// without running.
    pub fn shutdown(&self) {
        if self.shared.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Shutting down job manager");

        self.shared.scheduler_signal.set();
        for queue in &self.shared.queues {
            queue.abort();
        }

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                tracing::error!("Thread {} exited with a panic", name);
            }
        }

        let abandoned = {
            let mut ready = self.shared.ready.lock();
            let abandoned = ready.len();
            ready.clear();
            abandoned
        };
        self.shared.metrics.set_gauge("jobs.ready", 0);
        // Payload destructors run outside the arena lock.
        let entries = std::mem::take(&mut *self.shared.entries.lock());
        let released = entries.len();
        drop(entries);

        tracing::info!(
            "Job manager stopped ({} ready jobs abandoned, {} entries released)",
            abandoned,
            released
        );
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("workers", &self.worker_count())
            .field("entries", &self.entry_count())
            .field("ready", &self.pending_ready())
            .field("stopping", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobPriority;
    use std::sync::atomic::AtomicUsize;

    fn inline() -> JobManager {
        JobManager::new(JobConfig::inline()).unwrap()
    }

    // ==================== Ready Heap Tests ====================

    #[test]
    fn test_ready_order_priority_then_fifo() {
        let mut ids = SlotMap::<EntryId, ()>::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));
        let mut heap = BinaryHeap::new();
        heap.push(ReadyJob {
            priority: JobPriority::Normal,
            seq: 0,
            id: a,
        });
        heap.push(ReadyJob {
            priority: JobPriority::High,
            seq: 1,
            id: b,
        });
        heap.push(ReadyJob {
            priority: JobPriority::Normal,
            seq: 2,
            id: c,
        });

        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|j| j.id)).collect();
        assert_eq!(order, vec![b, a, c]);
    }

    // ==================== Inline Mode Tests ====================

    #[test]
    fn test_inline_runs_on_schedule() {
        let manager = inline();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let job = manager
            .create_fn_job(
                "count",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                JobOptions::new(),
            )
            .unwrap();

        assert!(!manager.is_executed(job).unwrap());
        manager.schedule(job).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_executed(job).unwrap());
        assert_eq!(manager.dependency_count(job).unwrap(), 0);
    }

    #[test]
    fn test_inline_respects_dependencies() {
        let manager = inline();
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str| {
            let log = Arc::clone(&log);
            manager
                .create_fn_job(name, move || log.lock().push(name), JobOptions::new())
                .unwrap()
        };
        let first = make("first");
        let second = make("second");
        assert!(manager.add_dependency(first, second).unwrap());

        manager.schedule(second).unwrap();
        assert!(log.lock().is_empty());
        manager.schedule(first).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_edge_to_finished_job_is_ignored() {
        let manager = inline();
        let first = manager.create_fn_job("first", || {}, JobOptions::new()).unwrap();
        manager.schedule(first).unwrap();

        let second = manager.create_fn_job("second", || {}, JobOptions::new()).unwrap();
        assert!(!manager.add_dependency(first, second).unwrap());
        assert_eq!(manager.dependency_count(second).unwrap(), 1);
    }

    #[test]
    fn test_auto_destroy_removes_entry() {
        let manager = inline();
        let job = manager
            .create_fn_job("oneshot", || {}, JobOptions::new().auto_destroy())
            .unwrap();
        manager.schedule(job).unwrap();

        assert!(!manager.contains(job));
        assert!(matches!(manager.is_executed(job), Err(JobError::StaleHandle(_))));
    }

    #[test]
    fn test_panicking_job_still_fires() {
        let manager = inline();
        let failing = manager
            .create_fn_job("boom", || panic!("job failure"), JobOptions::new())
            .unwrap();
        let after = manager.create_fn_job("after", || {}, JobOptions::new()).unwrap();
        manager.add_dependency(failing, after).unwrap();
        manager.schedule(after).unwrap();
        manager.schedule(failing).unwrap();

        assert!(manager.is_executed(after).unwrap());
        assert_eq!(manager.metrics().counter("jobs.panicked"), Some(1));
    }

    #[test]
    fn test_execution_time_recorded() {
        let manager = inline();
        let first = manager.create_fn_job("first", || {}, JobOptions::new()).unwrap();
        let boom = manager
            .create_fn_job("boom", || panic!("job failure"), JobOptions::new())
            .unwrap();
        manager.schedule(first).unwrap();
        manager.schedule(boom).unwrap();

        // Panicking payloads are timed too
        let histogram = manager.metrics().histogram("jobs.execute_us").unwrap();
        assert_eq!(histogram.count(), 2);
        assert_eq!(manager.metrics().counter("jobs.executed"), Some(2));
    }

    #[test]
    #[should_panic(expected = "scheduled twice")]
    fn test_double_schedule_panics() {
        let manager = inline();
        let job = manager.create_fn_job("twice", || {}, JobOptions::new()).unwrap();
        manager.schedule(job).unwrap();
        let _ = manager.schedule(job);
    }

    #[test]
    #[should_panic(expected = "auto-destroyed and synced")]
    fn test_auto_destroy_with_sync_rejected() {
        let manager = inline();
        let _ = manager.create_fn_job("bad", || {}, JobOptions::new().auto_destroy().with_sync());
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_destroy_then_stale() {
        let manager = inline();
        let job = manager.create_fn_job("gone", || {}, JobOptions::new()).unwrap();
        manager.destroy(job).unwrap();
        assert!(matches!(manager.destroy(job), Err(JobError::StaleHandle(_))));
        assert!(matches!(manager.schedule(job), Err(JobError::StaleHandle(_))));
    }

    #[test]
    fn test_create_after_shutdown_fails() {
        let manager = inline();
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shut_down());
        assert!(matches!(
            manager.create_fn_job("late", || {}, JobOptions::new()),
            Err(JobError::ShutDown)
        ));
        assert!(matches!(manager.create_sync_point(), Err(JobError::ShutDown)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = JobConfig {
            queue_capacity: 3,
            ..JobConfig::with_workers(1)
        };
        assert!(matches!(JobManager::new(config), Err(JobError::InvalidConfig(_))));
    }
}
