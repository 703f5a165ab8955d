//! Dependency graph nodes
//!
//! An entry's dependency count starts at 1, standing for "not yet released by
//! its owner", and grows by one per registered prerequisite edge. It reaches
//! zero exactly once; at that point the entry is ready. Edges are one-shot:
//! the dependents list is taken when the entry fires.

use crate::payload::JobPayload;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use strand_sync::{Event, SpinLock};

slotmap::new_key_type! {
    /// Generational handle to a job or sync point
    ///
    /// Once the entry is destroyed the handle goes stale; a recycled slot gets
    /// a new generation, so an old handle can never reach the new entry.
    pub struct EntryId;
}

/// Scheduling priority of a job
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Background work
    Low,
    /// Regular work
    #[default]
    Normal,
    /// Latency-sensitive work
    High,
}

/// Options fixed when a job is created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Scheduling priority
    pub priority: JobPriority,
    /// Destroy the job right after it has executed and notified dependents
    pub auto_destroy: bool,
    /// Allocate a completion event so the job can be joined with `sync`
    pub sync: bool,
}

impl JobOptions {
    /// Default options: normal priority, owned by the submitter, no sync event
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority
    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Destroy the job after execution
    pub fn auto_destroy(mut self) -> Self {
        self.auto_destroy = true;
        self
    }

    /// Enable `sync` on this job
    pub fn with_sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// Job-specific state
pub(crate) struct JobState {
    pub(crate) name: String,
    pub(crate) priority: JobPriority,
    pub(crate) auto_destroy: bool,
    pub(crate) executed: AtomicBool,
    pub(crate) payload: Mutex<Option<Box<dyn JobPayload>>>,
}

/// What an entry does once ready
pub(crate) enum EntryKind {
    /// Executes a payload on a worker
    Job(JobState),
    /// Fires as soon as it is ready; joins a group of prerequisites
    SyncPoint,
}

/// A node in the dependency graph
pub(crate) struct EntryNode {
    dependency_count: AtomicI32,
    dependents: SpinLock<Vec<EntryId>>,
    scheduled: AtomicBool,
    fired: AtomicBool,
    completion: Option<Event>,
    pub(crate) kind: EntryKind,
}

impl EntryNode {
    pub(crate) fn job(payload: Box<dyn JobPayload>, options: JobOptions) -> Self {
        let state = JobState {
            name: payload.name().to_string(),
            priority: options.priority,
            auto_destroy: options.auto_destroy,
            executed: AtomicBool::new(false),
            payload: Mutex::new(Some(payload)),
        };
        Self::new(EntryKind::Job(state), options.sync)
    }

    pub(crate) fn sync_point() -> Self {
        Self::new(EntryKind::SyncPoint, true)
    }

    fn new(kind: EntryKind, sync: bool) -> Self {
        Self {
            dependency_count: AtomicI32::new(1),
            dependents: SpinLock::new(Vec::new()),
            scheduled: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            completion: sync.then(Event::manual),
            kind,
        }
    }

    pub(crate) fn job_state(&self) -> Option<&JobState> {
        match &self.kind {
            EntryKind::Job(state) => Some(state),
            EntryKind::SyncPoint => None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match &self.kind {
            EntryKind::Job(state) => &state.name,
            EntryKind::SyncPoint => "sync-point",
        }
    }

    pub(crate) fn dependency_count(&self) -> i32 {
        self.dependency_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Record the owner's release of the initial count
    ///
    /// # Panics
    ///
    /// Panics if the entry was already scheduled.
    pub(crate) fn mark_scheduled(&self) {
        let already = self.scheduled.swap(true, Ordering::AcqRel);
        assert!(!already, "entry '{}' scheduled twice", self.name());
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Register `dependent_id` as waiting on this entry
    ///
    /// Only takes effect while this entry's own dependency count is above
    /// zero; otherwise the edge is dropped and `false` is returned.
    pub(crate) fn add_dependent(&self, dependent_id: EntryId, dependent: &EntryNode) -> bool {
        let mut dependents = self.dependents.lock();
        if self.dependency_count() <= 0 {
            return false;
        }
        dependent.increment_dependency();
        dependents.push(dependent_id);
        true
    }

    fn increment_dependency(&self) {
        let previous = self.dependency_count.fetch_add(1, Ordering::AcqRel);
        assert!(
            previous > 0,
            "cannot add a prerequisite to entry '{}' which is already ready",
            self.name()
        );
    }

    /// Decrement the dependency count; `true` exactly once, when it hits zero
    pub(crate) fn decrement_dependency(&self) -> bool {
        let previous = self.dependency_count.fetch_sub(1, Ordering::AcqRel);
        assert!(
            previous > 0,
            "dependency count of entry '{}' went negative",
            self.name()
        );
        previous == 1
    }

    /// Snapshot and clear the dependents list, marking the entry fired
    pub(crate) fn take_dependents(&self) -> Vec<EntryId> {
        let mut dependents = self.dependents.lock();
        let already = self.fired.swap(true, Ordering::AcqRel);
        assert!(!already, "entry '{}' fired twice", self.name());
        std::mem::take(&mut *dependents)
    }

    /// Signal the completion event, if any
    pub(crate) fn signal_completion(&self) {
        if let Some(event) = &self.completion {
            event.set();
        }
    }

    /// Block until the entry fired
    ///
    /// # Panics
    ///
    /// Panics if the entry was created without a completion event.
    pub(crate) fn wait(&self) {
        let event = self.completion.as_ref().unwrap_or_else(|| {
            panic!(
                "sync called on entry '{}' created without a completion event",
                self.name()
            )
        });
        event.wait();
    }
}
