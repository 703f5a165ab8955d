//! Resource hub: type registry, loading and completion processing
//!
//! Read completions arrive on filesystem threads and are queued on a
//! channel. With a job manager attached, each completion is processed by a
//! fire-and-forget job; without one, the owner drains the queue by calling
//! [`ResourceHub::update`].

use crate::body::ResourceFactory;
use crate::error::{ResourceError, ResourceResult};
use crate::fs::{FileHandle, FileSystem, ReadCallback, ReadChunk};
use crate::manager::ResourceManager;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::Resource;
use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use strand_jobs::{JobManager, JobOptions};
use strand_metrics::Metrics;

struct ReadCompletion {
    resource: Arc<Resource>,
    handle: FileHandle,
    epoch: u64,
    outcome: Result<Bytes, String>,
}

struct HubInner {
    managers: DashMap<ResourceType, Arc<ResourceManager>>,
    fs: Arc<dyn FileSystem>,
    completion_tx: Sender<ReadCompletion>,
    completion_rx: Receiver<ReadCompletion>,
    jobs: Option<Arc<JobManager>>,
    metrics: Arc<Metrics>,
    shut_down: AtomicBool,
}

impl HubInner {
    fn teardown(&self) -> usize {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return 0;
        }
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.fs.close(completion.handle);
        }
        // No table guard may be held while clearing: retiring a resource
        // waits for a parse that can still touch the table.
        let managers: Vec<Arc<ResourceManager>> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let destroyed = managers.iter().map(|manager| manager.clear()).sum();
        tracing::info!("Resource hub shut down ({} resources destroyed)", destroyed);
        destroyed
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Entry point for loading resources
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct ResourceHub {
    inner: Arc<HubInner>,
}

impl ResourceHub {
    /// Hub whose completions are processed by [`update`](Self::update)
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_metrics(fs, None, Arc::new(Metrics::new()))
    }

    /// Hub processing completions on `jobs`, sharing its metrics
    pub fn with_jobs(fs: Arc<dyn FileSystem>, jobs: Arc<JobManager>) -> Self {
        let metrics = Arc::clone(jobs.metrics());
        Self::with_metrics(fs, Some(jobs), metrics)
    }

    /// Hub recording into `metrics`
    pub fn with_metrics(
        fs: Arc<dyn FileSystem>,
        jobs: Option<Arc<JobManager>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(HubInner {
                managers: DashMap::new(),
                fs,
                completion_tx,
                completion_rx,
                jobs,
                metrics,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    // ==================== Registry ====================

    /// Register the factory for `type_name`
    pub fn register<F: ResourceFactory>(
        &self,
        type_name: &str,
        factory: F,
    ) -> ResourceResult<ResourceType> {
        let resource_type = ResourceType::of(type_name);
        self.manager_entry(resource_type)
            .set_factory(type_name, Arc::new(factory))?;
        tracing::info!("Registered resource type '{}' ({})", type_name, resource_type);
        Ok(resource_type)
    }

    /// Table for `resource_type`, if anything of that type was registered or
    /// loaded
    pub fn manager(&self, resource_type: ResourceType) -> Option<Arc<ResourceManager>> {
        self.inner
            .managers
            .get(&resource_type)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn manager_entry(&self, resource_type: ResourceType) -> Arc<ResourceManager> {
        let entry = self
            .inner
            .managers
            .entry(resource_type)
            .or_insert_with(|| Arc::new(ResourceManager::new(resource_type)));
        Arc::clone(entry.value())
    }

    // ==================== Loading ====================

    /// Load the resource at `path`, taking a reference
    ///
    /// The first reference starts the read; later ones share the instance.
    /// Each call must be balanced by [`unload`](Self::unload).
    pub fn load(&self, resource_type: ResourceType, path: &str) -> ResourceResult<Arc<Resource>> {
        if self.is_shut_down() {
            return Err(ResourceError::ShutDown);
        }
        let manager = self.manager_entry(resource_type);
        let (resource, start) = manager.acquire(ResourcePath::new(path), &self.inner.metrics);
        self.inner.metrics.incr("resources.loads", 1);
        if let Some(epoch) = start {
            self.start_load(&manager, &resource, epoch);
        }
        Ok(resource)
    }

    /// Release one reference; the last one resets the resource to EMPTY and
    /// releases its dependencies
    pub fn unload(&self, resource: &Arc<Resource>) {
        if resource.release() {
            self.inner.metrics.incr("resources.unloads", 1);
        }
    }

    /// Discard the loaded data of a referenced resource and read it again
    ///
    /// Returns `false` if the resource has no references.
    pub fn reload(&self, resource: &Arc<Resource>) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let Some(epoch) = resource.restart() else {
            return false;
        };
        self.inner.metrics.incr("resources.reloads", 1);
        let manager = self.manager_entry(resource.resource_type());
        self.start_load(&manager, resource, epoch);
        true
    }

    /// Resource at `path`, if it is in the table
    pub fn get(&self, resource_type: ResourceType, path: &str) -> Option<Arc<Resource>> {
        self.manager(resource_type)?.get(path)
    }

    fn start_load(&self, manager: &ResourceManager, resource: &Arc<Resource>, epoch: u64) {
        let Some(factory) = manager.factory() else {
            tracing::warn!(
                "No factory for {} (type {})",
                resource.path(),
                resource.resource_type()
            );
            resource.fail(epoch, ResourceError::MissingFactory(resource.resource_type()));
            return;
        };
        resource.ensure_body(factory.as_ref());

        let path = resource.path().as_str();
        let handle = match self.inner.fs.open(path) {
            Ok(handle) => handle,
            Err(err) => {
                resource.fail(
                    epoch,
                    ResourceError::Read {
                        path: path.to_string(),
                        reason: err.to_string(),
                    },
                );
                return;
            }
        };
        tracing::debug!("Reading {}", path);
        let callback = self.read_callback(Arc::clone(resource), handle, epoch);
        self.inner.fs.read(handle, 0, None, callback);
    }

    fn read_callback(
        &self,
        resource: Arc<Resource>,
        handle: FileHandle,
        epoch: u64,
    ) -> ReadCallback {
        let tx = self.inner.completion_tx.clone();
        let hub = Arc::downgrade(&self.inner);
        let mut buffer = BytesMut::new();
        let mut failed = false;
        let mut resource = Some(resource);

        Box::new(move |chunk: ReadChunk| {
            if chunk.success {
                buffer.extend_from_slice(&chunk.data);
            } else {
                failed = true;
            }
            if !chunk.last {
                return;
            }
            let Some(resource) = resource.take() else {
                return;
            };
            let outcome = if failed {
                Err("read did not complete".to_string())
            } else {
                Ok(std::mem::take(&mut buffer).freeze())
            };
            let completion = ReadCompletion {
                resource,
                handle,
                epoch,
                outcome,
            };
            if tx.send(completion).is_err() {
                return;
            }
            dispatch_completion(&hub);
        })
    }

    // ==================== Completions ====================

    /// Process every queued completion on the calling thread; returns how
    /// many were processed
    pub fn update(&self) -> usize {
        let mut processed = 0;
        while self.process_next() {
            processed += 1;
        }
        processed
    }

    /// Completions waiting to be processed
    pub fn pending_completions(&self) -> usize {
        self.inner.completion_rx.len()
    }

    fn process_next(&self) -> bool {
        match self.inner.completion_rx.try_recv() {
            Ok(completion) => {
                self.process(completion);
                true
            }
            Err(_) => false,
        }
    }

    fn process(&self, completion: ReadCompletion) {
        let ReadCompletion {
            resource,
            handle,
            epoch,
            outcome,
        } = completion;
        self.inner.fs.close(handle);

        if resource.epoch() != epoch {
            tracing::debug!("Discarding stale read of {}", resource.path());
            self.inner.metrics.incr("resources.stale", 1);
            return;
        }

        match outcome {
            Err(reason) => resource.fail(
                epoch,
                ResourceError::Read {
                    path: resource.path().to_string(),
                    reason,
                },
            ),
            Ok(data) => {
                self.inner.metrics.incr("resources.bytes_read", data.len() as u64);
                if let Some(result) = resource.parse(epoch, &data, self) {
                    resource.finish_parse(epoch, result);
                }
            }
        }
    }

    // ==================== Maintenance ====================

    /// Destroy unreferenced resources in every table
    pub fn purge(&self) -> usize {
        let managers: Vec<Arc<ResourceManager>> = self
            .inner
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let purged: usize = managers.iter().map(|manager| manager.purge()).sum();
        if purged > 0 {
            self.inner.metrics.incr("resources.purged", purged as u64);
            tracing::debug!("Purged {} resources", purged);
        }
        purged
    }

    /// Number of resources across all tables
    pub fn resource_count(&self) -> usize {
        self.inner
            .managers
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Shared metrics
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Filesystem reads go through
    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.inner.fs
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Refuse further loads, drop queued completions and destroy every
    /// resource; returns how many were destroyed
    pub fn shutdown(&self) -> usize {
        self.inner.teardown()
    }
}

/// Hand one queued completion to the job manager, if the hub has one
fn dispatch_completion(hub: &Weak<HubInner>) {
    let Some(inner) = hub.upgrade() else {
        return;
    };
    let Some(jobs) = inner.jobs.as_ref() else {
        return;
    };
    let target = Weak::clone(hub);
    let submitted = jobs
        .create_fn_job(
            "resource-completion",
            move || {
                if let Some(inner) = target.upgrade() {
                    ResourceHub { inner }.process_next();
                }
            },
            JobOptions::new().auto_destroy(),
        )
        .and_then(|id| jobs.schedule(id));
    if let Err(err) = submitted {
        tracing::debug!("Completion left for update(): {}", err);
    }
}

impl std::fmt::Debug for ResourceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHub")
            .field("types", &self.inner.managers.len())
            .field("resources", &self.resource_count())
            .field("pending_completions", &self.pending_completions())
            .field("jobs", &self.inner.jobs.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{LoadContext, ParseError, ResourceBody};
    use crate::fs::MemoryFileSystem;
    use crate::state::ResourceState;
    use std::any::Any;

    #[derive(Default)]
    struct Blob {
        bytes: Vec<u8>,
    }

    impl ResourceBody for Blob {
        fn parse(&mut self, data: &[u8], _ctx: &mut LoadContext<'_>) -> Result<(), ParseError> {
            self.bytes = data.to_vec();
            Ok(())
        }

        fn unload(&mut self) {
            self.bytes.clear();
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn blob_hub(fs: Arc<MemoryFileSystem>) -> (ResourceHub, ResourceType) {
        let hub = ResourceHub::new(fs);
        let blob = hub.register("blob", blob_factory).unwrap();
        (hub, blob)
    }

    fn blob_factory(_: &ResourcePath) -> Box<dyn ResourceBody> {
        Box::new(Blob::default())
    }

    #[test]
    fn test_register_twice_rejected() {
        let (hub, blob) = blob_hub(Arc::new(MemoryFileSystem::new()));
        let again = hub.register("blob", blob_factory);
        assert_eq!(again, Err(ResourceError::AlreadyRegistered(blob)));
        assert_eq!(hub.manager(blob).unwrap().name(), "blob");
    }

    #[test]
    fn test_update_processes_queued_completions() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("a.bin", "abc");
        let (hub, blob) = blob_hub(Arc::clone(&fs));

        let res = hub.load(blob, "a.bin").unwrap();
        assert_eq!(res.state(), ResourceState::Empty);
        assert_eq!(hub.pending_completions(), 1);

        assert_eq!(hub.update(), 1);
        assert!(res.is_ready());
        assert_eq!(res.size(), 3);
        assert_eq!(res.with_body(|blob: &Blob| blob.bytes.clone()), Some(b"abc".to_vec()));
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_same_path_shares_instance() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("a.bin", "abc");
        let (hub, blob) = blob_hub(fs);

        let first = hub.load(blob, "a.bin").unwrap();
        let second = hub.load(blob, "./A.BIN").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.ref_count(), 2);
        assert_eq!(hub.pending_completions(), 1);
    }

    #[test]
    fn test_missing_file_fails() {
        let (hub, blob) = blob_hub(Arc::new(MemoryFileSystem::new()));
        let res = hub.load(blob, "nope").unwrap();
        assert!(res.is_failure());
        assert!(matches!(res.last_error(), Some(ResourceError::Read { .. })));
    }

    #[test]
    fn test_load_after_shutdown() {
        let (hub, blob) = blob_hub(Arc::new(MemoryFileSystem::new()));
        assert_eq!(hub.shutdown(), 0);
        assert!(matches!(hub.load(blob, "a"), Err(ResourceError::ShutDown)));
        assert_eq!(hub.shutdown(), 0);
    }
}
