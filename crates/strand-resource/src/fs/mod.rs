//! Filesystem collaborator interface
//!
//! Reads are asynchronous: `read` returns at once and the callback receives
//! the data in one or more chunks, on whatever thread the implementation
//! chooses. The last chunk has `last == true`.

mod disk;
mod memory;

pub use disk::DiskFileSystem;
pub use memory::{DeliveryMode, MemoryFileSystem};

use crate::error::FsResult;
use bytes::Bytes;

/// Opaque handle to an open file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle(pub(crate) u64);

impl FileHandle {
    /// Raw handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One delivery of read data
#[derive(Clone, Debug)]
pub struct ReadChunk {
    /// Bytes in this chunk
    pub bytes_read: u64,
    /// Chunk data
    pub data: Bytes,
    /// Whether the read succeeded so far
    pub success: bool,
    /// Whether this is the final chunk
    pub last: bool,
}

impl ReadChunk {
    /// Final chunk reporting a failed read
    pub fn failed() -> Self {
        Self {
            bytes_read: 0,
            data: Bytes::new(),
            success: false,
            last: true,
        }
    }
}

/// Callback receiving read chunks
pub type ReadCallback = Box<dyn FnMut(ReadChunk) + Send>;

/// Asynchronous file access used by the resource pipeline
pub trait FileSystem: Send + Sync {
    /// Open `path` for reading
    fn open(&self, path: &str) -> FsResult<FileHandle>;

    /// Read `size` bytes (or to the end) starting at `offset`
    ///
    /// Failures, including an invalid handle, are reported through the
    /// callback as a final chunk with `success == false`.
    fn read(&self, handle: FileHandle, offset: u64, size: Option<u64>, callback: ReadCallback);

    /// Release a handle
    fn close(&self, handle: FileHandle);
}

/// Split `data` into chunks of at most `chunk_size` bytes and deliver them
pub(crate) fn deliver_chunks(data: Bytes, chunk_size: usize, callback: &mut ReadCallback) {
    let chunk_size = chunk_size.max(1);
    if data.is_empty() {
        callback(ReadChunk {
            bytes_read: 0,
            data,
            success: true,
            last: true,
        });
        return;
    }
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        let chunk = data.slice(offset..end);
        callback(ReadChunk {
            bytes_read: chunk.len() as u64,
            data: chunk,
            success: true,
            last: end == data.len(),
        });
        offset = end;
    }
}

/// Bytes of `data` selected by `offset` and `size`
pub(crate) fn select_range(data: &Bytes, offset: u64, size: Option<u64>) -> Bytes {
    let start = (offset as usize).min(data.len());
    let end = match size {
        Some(size) => start.saturating_add(size as usize).min(data.len()),
        None => data.len(),
    };
    data.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn collect(data: &'static [u8], chunk_size: usize) -> Vec<ReadChunk> {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&chunks);
        let mut callback: ReadCallback = Box::new(move |chunk| sink.lock().push(chunk));
        deliver_chunks(Bytes::from_static(data), chunk_size, &mut callback);
        let chunks = chunks.lock().clone();
        chunks
    }

    #[test]
    fn test_chunking() {
        let chunks = collect(b"abcdefg", 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[2].data[..], b"g");
        assert!(chunks[2].last);
        assert!(!chunks[0].last);
    }

    #[test]
    fn test_empty_file_single_chunk() {
        let chunks = collect(b"", 16);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].last && chunks[0].success);
    }

    #[test]
    fn test_select_range() {
        let data = Bytes::from_static(b"0123456789");
        assert_eq!(&select_range(&data, 2, Some(3))[..], b"234");
        assert_eq!(&select_range(&data, 8, None)[..], b"89");
        assert!(select_range(&data, 20, Some(4)).is_empty());
    }
}
