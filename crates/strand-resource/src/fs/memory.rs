//! In-memory filesystem with controllable completion delivery

use super::{deliver_chunks, select_range, FileHandle, FileSystem, ReadCallback, ReadChunk};
use crate::error::{FsError, FsResult};
use crate::path::normalize_path;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// When read callbacks run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Inside `read`, on the calling thread
    Immediate,
    /// Only when the owner calls [`MemoryFileSystem::complete_next`] and friends
    Deferred,
}

struct PendingRead {
    path: String,
    data: Option<Bytes>,
    callback: ReadCallback,
}

/// Filesystem backed by a map of byte buffers
///
/// In deferred mode reads queue up until the test drives them, which makes
/// completion order fully deterministic.
pub struct MemoryFileSystem {
    files: DashMap<String, Bytes>,
    failing: DashSet<String>,
    handles: DashMap<u64, String>,
    next_handle: AtomicU64,
    mode: DeliveryMode,
    chunk_size: usize,
    pending: Mutex<VecDeque<PendingRead>>,
}

impl MemoryFileSystem {
    /// Filesystem delivering reads immediately
    pub fn new() -> Self {
        Self::with_mode(DeliveryMode::Immediate)
    }

    /// Filesystem queueing reads until driven
    pub fn deferred() -> Self {
        Self::with_mode(DeliveryMode::Deferred)
    }

    /// Filesystem with the given delivery mode
    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            files: DashMap::new(),
            failing: DashSet::new(),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
            mode,
            chunk_size: 64 * 1024,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Deliver data in chunks of at most `chunk_size` bytes
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delivery mode
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Add or replace a file
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.files.insert(normalize_path(path), data.into());
    }

    /// Remove a file
    pub fn remove(&self, path: &str) -> bool {
        self.files.remove(&normalize_path(path)).is_some()
    }

    /// Make reads of `path` fail after a successful open
    pub fn fail_reads(&self, path: &str) {
        self.failing.insert(normalize_path(path));
    }

    /// Let reads of `path` succeed again
    pub fn clear_failure(&self, path: &str) {
        self.failing.remove(&normalize_path(path));
    }

    /// Number of open handles
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of reads waiting for delivery
    pub fn pending_reads(&self) -> usize {
        self.pending.lock().len()
    }

    /// Deliver the oldest pending read; `false` if none was pending
    pub fn complete_next(&self) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some(read) => {
                self.deliver(read);
                true
            }
            None => false,
        }
    }

    /// Deliver the oldest pending read of `path`; `false` if none was pending
    pub fn complete_path(&self, path: &str) -> bool {
        let key = normalize_path(path);
        let next = {
            let mut pending = self.pending.lock();
            let position = pending.iter().position(|read| read.path == key);
            position.and_then(|index| pending.remove(index))
        };
        match next {
            Some(read) => {
                self.deliver(read);
                true
            }
            None => false,
        }
    }

    /// Deliver pending reads, including ones queued by callbacks, until none
    /// remain; returns how many were delivered
    pub fn complete_all(&self) -> usize {
        let mut delivered = 0;
        while self.complete_next() {
            delivered += 1;
        }
        delivered
    }

    fn deliver(&self, read: PendingRead) {
        let PendingRead {
            data, mut callback, ..
        } = read;
        match data {
            Some(data) => deliver_chunks(data, self.chunk_size, &mut callback),
            None => callback(ReadChunk::failed()),
        }
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, path: &str) -> FsResult<FileHandle> {
        let key = normalize_path(path);
        if !self.files.contains_key(&key) {
            return Err(FsError::NotFound(path.to_string()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(handle, key);
        Ok(FileHandle(handle))
    }

    fn read(&self, handle: FileHandle, offset: u64, size: Option<u64>, callback: ReadCallback) {
        let path = self.handles.get(&handle.0).map(|entry| entry.value().clone());
        let data = path.as_ref().and_then(|path| {
            if self.failing.contains(path) {
                return None;
            }
            self.files
                .get(path)
                .map(|data| select_range(data.value(), offset, size))
        });
        let read = PendingRead {
            path: path.unwrap_or_default(),
            data,
            callback,
        };
        match self.mode {
            DeliveryMode::Immediate => self.deliver(read),
            DeliveryMode::Deferred => self.pending.lock().push_back(read),
        }
    }

    fn close(&self, handle: FileHandle) {
        self.handles.remove(&handle.0);
    }
}

impl std::fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFileSystem")
            .field("files", &self.files.len())
            .field("mode", &self.mode)
            .field("pending", &self.pending_reads())
            .finish()
    }
}
