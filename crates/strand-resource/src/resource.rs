//! Resource instances and their state machine
//!
//! A resource is a specialised dependency-graph entry: EMPTY is "pending",
//! and its dependency counters play the role of the entry's count. Its own
//! pending read is one empty dependency; every referenced resource adds one
//! more while it is EMPTY, or a failed dependency while it is in FAILURE.
//!
//! Counter changes and the state transitions they cause happen under the
//! resource's `transition` lock, which is also held while observers run, so
//! a parent sees its children's transitions in order. Locks are taken child
//! before parent.

use crate::body::{LoadContext, ResourceBody, ResourceFactory};
use crate::error::ResourceError;
use crate::hub::ResourceHub;
use crate::path::{ResourcePath, ResourceType};
use crate::state::{transitions, Delta, DependencyCounters, ResourceState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use strand_metrics::Metrics;
use strand_sync::SpinLock;

/// Observer callback: `(old, new, resource)`
///
/// Runs on whichever thread caused the transition. It must not load,
/// unload or reload the resource it observes.
pub type ObserverFn = dyn Fn(ResourceState, ResourceState, &Resource) + Send + Sync;

/// Identifies a registered observer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Dependency {
    child: Arc<Resource>,
    observer: ObserverId,
}

/// A loadable asset instance
pub struct Resource {
    path: ResourcePath,
    resource_type: ResourceType,
    ref_count: AtomicU16,
    state: AtomicU8,
    size: AtomicU64,
    /// Bumped on every unload; work issued under an older epoch is discarded
    epoch: AtomicU64,
    counters: SpinLock<DependencyCounters>,
    transition: Mutex<()>,
    /// Serializes reference count changes with starting and resetting loads
    lifecycle: Mutex<()>,
    body: Mutex<Option<Box<dyn ResourceBody>>>,
    last_error: Mutex<Option<ResourceError>>,
    observers: Mutex<Vec<(ObserverId, Arc<ObserverFn>)>>,
    next_observer: AtomicU64,
    dependencies: Mutex<Vec<Dependency>>,
    metrics: Arc<Metrics>,
}

impl Resource {
    pub(crate) fn new(
        path: ResourcePath,
        resource_type: ResourceType,
        body: Option<Box<dyn ResourceBody>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            path,
            resource_type,
            ref_count: AtomicU16::new(0),
            state: AtomicU8::new(ResourceState::Empty as u8),
            size: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            counters: SpinLock::new(DependencyCounters::PENDING),
            transition: Mutex::new(()),
            lifecycle: Mutex::new(()),
            body: Mutex::new(body),
            last_error: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            dependencies: Mutex::new(Vec::new()),
            metrics,
        }
    }

    // ==================== Queries ====================

    /// Resource path
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Resource type
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Current state
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the resource is EMPTY
    pub fn is_empty(&self) -> bool {
        self.state() == ResourceState::Empty
    }

    /// Whether the resource is READY
    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    /// Whether the resource is in FAILURE
    pub fn is_failure(&self) -> bool {
        self.state() == ResourceState::Failure
    }

    /// Outstanding loads
    pub fn ref_count(&self) -> u16 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Size of the data read for the current load
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Dependencies (own data included) not loaded yet
    pub fn empty_dependency_count(&self) -> u16 {
        self.counters.lock().empty
    }

    /// Dependencies (own data included) that failed
    pub fn failed_dependency_count(&self) -> u16 {
        self.counters.lock().failed
    }

    /// Error behind the current FAILURE of this resource itself
    ///
    /// `None` when the failure comes from a dependency; check
    /// [`dependencies`](Self::dependencies).
    pub fn last_error(&self) -> Option<ResourceError> {
        self.last_error.lock().clone()
    }

    /// Resources loaded by the current parse
    pub fn dependencies(&self) -> Vec<Arc<Resource>> {
        self.dependencies
            .lock()
            .iter()
            .map(|dependency| Arc::clone(&dependency.child))
            .collect()
    }

    /// Run `f` on the body if it is a `T`
    pub fn with_body<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let body = self.body.lock();
        body.as_ref()?.as_any().downcast_ref::<T>().map(f)
    }

    // ==================== Observers ====================

    /// Register a callback for every state transition
    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(ResourceState, ResourceState, &Resource) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove an observer; `false` if it was not registered
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }

    /// Register `callback` and report the state it starts from, with no
    /// transition in between
    fn observe_from_current<F>(&self, callback: F, start: impl FnOnce(ResourceState)) -> ObserverId
    where
        F: Fn(ResourceState, ResourceState, &Resource) + Send + Sync + 'static,
    {
        let _order = self.transition.lock();
        let id = self.observe(callback);
        start(self.state());
        id
    }

    // ==================== State Machine ====================

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Apply `delta` if `epoch` is current and publish the transitions it
    /// causes; `prepare` runs first, under the same lock
    fn update(&self, epoch: u64, delta: Delta, prepare: impl FnOnce()) -> bool {
        let _order = self.transition.lock();
        if self.epoch() != epoch {
            return false;
        }
        prepare();
        let steps = {
            let mut counters = self.counters.lock();
            counters.apply(delta);
            self.advance(&counters)
        };
        self.publish(steps);
        true
    }

    fn advance(&self, counters: &DependencyCounters) -> Vec<(ResourceState, ResourceState)> {
        let current = self.state();
        let target = counters.target(current, self.ref_count() > 0);
        if target != current {
            self.state.store(target as u8, Ordering::Release);
        }
        transitions(current, target)
    }

    fn publish(&self, steps: Vec<(ResourceState, ResourceState)>) {
        for (old, new) in steps {
            match new {
                ResourceState::Ready => {
                    self.metrics.incr("resources.ready", 1);
                    tracing::debug!("Resource {} is ready", self.path);
                }
                ResourceState::Failure => {
                    self.metrics.incr("resources.failed", 1);
                    tracing::warn!("Resource {} failed to load", self.path);
                }
                ResourceState::Empty => {
                    tracing::debug!("Resource {} is empty (was {})", self.path, old);
                }
            }
            let observers: Vec<Arc<ObserverFn>> = self
                .observers
                .lock()
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();
            for observer in observers {
                observer(old, new, self);
            }
        }
    }

    /// Take a reference; returns the epoch to load under if this was the first
    pub(crate) fn acquire(&self) -> Option<u64> {
        let _lifecycle = self.lifecycle.lock();
        let previous = self.ref_count();
        assert!(previous < u16::MAX, "reference count overflow on {}", self.path);
        self.ref_count.store(previous + 1, Ordering::Release);
        (previous == 0).then(|| self.epoch())
    }

    /// Undo an [`acquire`](Self::acquire) whose load was never started
    pub(crate) fn abandon(&self) {
        let _lifecycle = self.lifecycle.lock();
        let previous = self.ref_count();
        if previous > 0 {
            self.ref_count.store(previous - 1, Ordering::Release);
        }
    }

    /// Drop a reference, resetting the resource when it was the last one
    pub(crate) fn release(&self) -> bool {
        let _lifecycle = self.lifecycle.lock();
        let previous = self.ref_count();
        if previous == 0 {
            tracing::warn!("Unbalanced unload of {}", self.path);
            return false;
        }
        self.ref_count.store(previous - 1, Ordering::Release);
        if previous == 1 {
            self.reset();
        }
        true
    }

    /// Reset a referenced resource for a fresh load; returns the new epoch
    pub(crate) fn restart(&self) -> Option<u64> {
        let _lifecycle = self.lifecycle.lock();
        if self.ref_count() == 0 {
            return None;
        }
        self.reset();
        Some(self.epoch())
    }

    /// Back to EMPTY with nothing loaded; caller holds `lifecycle`
    fn reset(&self) {
        {
            let _order = self.transition.lock();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *self.last_error.lock() = None;
            let steps = {
                let mut counters = self.counters.lock();
                *counters = DependencyCounters::PENDING;
                self.advance(&counters)
            };
            self.publish(steps);
        }

        // Waits for a parse in progress, which may still attach dependencies.
        if let Some(body) = self.body.lock().as_mut() {
            body.unload();
        }
        self.size.store(0, Ordering::Release);
        self.release_dependencies();
    }

    fn release_dependencies(&self) {
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for dependency in dependencies {
            dependency.child.unobserve(dependency.observer);
            dependency.child.release();
        }
    }

    /// Remove the body for destruction; the resource is unusable afterwards
    pub(crate) fn retire(&self) -> Option<Box<dyn ResourceBody>> {
        {
            let _order = self.transition.lock();
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        let body = self.body.lock().take();
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for dependency in dependencies {
            dependency.child.unobserve(dependency.observer);
        }
        body
    }

    pub(crate) fn ensure_body(&self, factory: &dyn ResourceFactory) {
        let mut body = self.body.lock();
        if body.is_none() {
            *body = Some(factory.create(&self.path));
        }
    }

    /// Own data or a dependency failed under `epoch`
    pub(crate) fn fail(&self, epoch: u64, error: ResourceError) {
        let applied = self.update(epoch, Delta::FAILED, || {
            tracing::debug!("{}", error);
            *self.last_error.lock() = Some(error.clone());
        });
        if !applied {
            tracing::debug!("Ignoring stale failure of {}", self.path);
        }
    }

    /// Run the body's parser on data read under `epoch`
    ///
    /// `None` if the resource was unloaded since the read was issued.
    pub(crate) fn parse(
        self: &Arc<Self>,
        epoch: u64,
        data: &[u8],
        hub: &ResourceHub,
    ) -> Option<Result<(), ResourceError>> {
        let mut body = self.body.lock();
        if self.epoch() != epoch {
            return None;
        }
        self.size.store(data.len() as u64, Ordering::Release);
        let Some(body) = body.as_mut() else {
            return Some(Err(ResourceError::MissingFactory(self.resource_type)));
        };

        let mut ctx = LoadContext::new(hub, self, epoch);
        let result = body.parse(data, &mut ctx).map_err(|err| ResourceError::Parse {
            path: self.path.to_string(),
            reason: err.to_string(),
        });
        tracing::debug!(
            "Parsed {} ({} bytes, {} dependencies)",
            self.path,
            data.len(),
            ctx.dependency_count()
        );
        Some(result)
    }

    /// Resolve the resource's own pending data after a parse
    pub(crate) fn finish_parse(&self, epoch: u64, result: Result<(), ResourceError>) {
        match result {
            Ok(()) => {
                self.update(epoch, Delta::RESOLVED, || {});
            }
            Err(err) => self.fail(epoch, err),
        }
    }

    /// Make this resource wait on `child`; `false` if this resource was
    /// unloaded since `epoch`
    pub(crate) fn attach_dependency(self: &Arc<Self>, epoch: u64, child: &Arc<Resource>) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        let parent = Arc::downgrade(self);
        let observer = move |old: ResourceState, new: ResourceState, _: &Resource| {
            let delta = Delta::transition(old, new);
            if delta.is_zero() {
                return;
            }
            if let Some(parent) = parent.upgrade() {
                parent.update(epoch, delta, || {});
            }
        };
        let id = child.observe_from_current(observer, |state| {
            let delta = Delta::attach(state);
            if !delta.is_zero() {
                self.update(epoch, delta, || {});
            }
        });
        self.dependencies.lock().push(Dependency {
            child: Arc::clone(child),
            observer: id,
        });
        true
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path.as_str())
            .field("type", &self.resource_type)
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .field("size", &self.size())
            .finish()
    }
}
