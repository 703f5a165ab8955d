//! Threaded filesystem over a root directory

use super::{deliver_chunks, FileHandle, FileSystem, ReadCallback, ReadChunk};
use crate::error::{FsError, FsResult};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

const CHUNK_SIZE: usize = 64 * 1024;

struct ReadRequest {
    path: PathBuf,
    offset: u64,
    size: Option<u64>,
    callback: ReadCallback,
}

/// Filesystem reading files under a root directory on I/O threads
///
/// Callbacks run on the I/O threads.
pub struct DiskFileSystem {
    root: PathBuf,
    handles: DashMap<u64, PathBuf>,
    next_handle: AtomicU64,
    requests: Mutex<Option<Sender<ReadRequest>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl DiskFileSystem {
    /// Serve files under `root` with `io_threads` reader threads
    pub fn new(root: impl Into<PathBuf>, io_threads: usize) -> FsResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FsError::NotFound(root.display().to_string()));
        }

        let (tx, rx) = crossbeam_channel::unbounded::<ReadRequest>();
        let mut threads = Vec::with_capacity(io_threads.max(1));
        for index in 0..io_threads.max(1) {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("strand-io-{index}"))
                .spawn(move || io_loop(rx))?;
            threads.push(handle);
        }
        tracing::debug!(
            "Disk filesystem at {} with {} I/O threads",
            root.display(),
            threads.len()
        );

        Ok(Self {
            root,
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
            requests: Mutex::new(Some(tx)),
            threads: Mutex::new(threads),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting reads and join the I/O threads
    ///
    /// Reads already queued are still delivered.
    pub fn shutdown(&self) {
        self.requests.lock().take();
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            if handle.join().is_err() {
                tracing::error!("I/O thread exited with a panic");
            }
        }
    }
}

fn io_loop(requests: Receiver<ReadRequest>) {
    for request in requests {
        let ReadRequest {
            path,
            offset,
            size,
            mut callback,
        } = request;
        match read_range(&path, offset, size) {
            Ok(data) => deliver_chunks(Bytes::from(data), CHUNK_SIZE, &mut callback),
            Err(err) => {
                tracing::warn!("Read of {} failed: {}", path.display(), err);
                callback(ReadChunk::failed());
            }
        }
    }
}

fn read_range(path: &Path, offset: u64, size: Option<u64>) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut data = Vec::new();
    match size {
        Some(size) => {
            file.take(size).read_to_end(&mut data)?;
        }
        None => {
            file.read_to_end(&mut data)?;
        }
    }
    Ok(data)
}

impl FileSystem for DiskFileSystem {
    fn open(&self, path: &str) -> FsResult<FileHandle> {
        let full = self.root.join(path.replace('\\', "/"));
        if !full.is_file() {
            return Err(FsError::NotFound(path.to_string()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(handle, full);
        Ok(FileHandle(handle))
    }

    fn read(&self, handle: FileHandle, offset: u64, size: Option<u64>, mut callback: ReadCallback) {
        let Some(path) = self.handles.get(&handle.0).map(|entry| entry.value().clone()) else {
            callback(ReadChunk::failed());
            return;
        };
        let request = ReadRequest {
            path,
            offset,
            size,
            callback,
        };
        let rejected = match self.requests.lock().as_ref() {
            Some(tx) => tx.send(request).err().map(|err| err.into_inner()),
            None => Some(request),
        };
        if let Some(mut request) = rejected {
            (request.callback)(ReadChunk::failed());
        }
    }

    fn close(&self, handle: FileHandle) {
        self.handles.remove(&handle.0);
    }
}

impl Drop for DiskFileSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DiskFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFileSystem")
            .field("root", &self.root)
            .field("open_handles", &self.handles.len())
            .finish()
    }
}
