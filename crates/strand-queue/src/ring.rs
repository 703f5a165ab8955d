//! Lock-free bounded ring of slot indices
//!
//! Every cell is a single 64-bit word holding `(tag, value)`: the tag is the
//! low 32 bits of the monotonic index the cell was last written or released
//! for, the value is a slot index or [`EMPTY`]. Claiming a cell is one
//! compare-and-swap on that word. Read and write indices are monotonic `u64`
//! counters, masked only when indexing the cell array.
//!
//! A thread that finds a cell already claimed for the index it read helps
//! advance that index and retries, so a stalled thread never blocks others.

use crossbeam_utils::{Backoff, CachePadded};
use std::sync::atomic::{AtomicU64, Ordering};

/// Value marking a cell with no slot index
const EMPTY: u32 = u32::MAX;

#[inline]
fn pack(tag: u32, value: u32) -> u64 {
    ((tag as u64) << 32) | value as u64
}

#[inline]
fn tag_of(word: u64) -> u32 {
    (word >> 32) as u32
}

#[inline]
fn value_of(word: u64) -> u32 {
    word as u32
}

/// Lock-free bounded multi-producer multi-consumer ring of `u32` indices
pub struct IndexRing {
    cells: Box<[AtomicU64]>,
    mask: u64,
    write: CachePadded<AtomicU64>,
    read: CachePadded<AtomicU64>,
}

impl IndexRing {
    /// Create an empty ring
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a non-zero power of two.
    pub fn new(capacity: usize) -> Self {
        Self::check_capacity(capacity);
        let cells = (0..capacity)
            .map(|i| AtomicU64::new(pack(i as u32, EMPTY)))
            .collect();
        Self {
            cells,
            mask: capacity as u64 - 1,
            write: CachePadded::new(AtomicU64::new(0)),
            read: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Create a ring pre-filled with `0..capacity`, in order
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a non-zero power of two.
    pub fn full(capacity: usize) -> Self {
        Self::check_capacity(capacity);
        let cells = (0..capacity)
            .map(|i| AtomicU64::new(pack(i as u32, i as u32)))
            .collect();
        Self {
            cells,
            mask: capacity as u64 - 1,
            write: CachePadded::new(AtomicU64::new(capacity as u64)),
            read: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn check_capacity(capacity: usize) {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a non-zero power of two, got {capacity}"
        );
        assert!(
            capacity < EMPTY as usize,
            "ring capacity {capacity} does not fit a 32-bit slot index"
        );
    }

    /// Fixed capacity of the ring
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of queued indices (a snapshot under concurrency)
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.saturating_sub(read) as usize
    }

    /// Check if the ring is empty (a snapshot under concurrency)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `value`; returns `false` if the ring is full
    ///
    /// # Panics
    ///
    /// Panics if `value` is `u32::MAX`, which marks an empty cell.
    pub fn try_push(&self, value: u32) -> bool {
        assert_ne!(value, EMPTY, "u32::MAX is reserved for empty cells");
        let capacity = self.cells.len() as u64;
        let backoff = Backoff::new();

        loop {
            let write = self.write.load(Ordering::Acquire);
            let read = self.read.load(Ordering::Acquire);
            let cell = &self.cells[(write & self.mask) as usize];
            let current = cell.load(Ordering::Acquire);
            let tag = write as u32;

            if write.wrapping_sub(read) >= capacity {
                if tag_of(current) == tag && value_of(current) == EMPTY {
                    // Oldest cell already released, the read index is lagging.
                    let _ = self.read.compare_exchange(
                        read,
                        read + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                    continue;
                }
                if self.write.load(Ordering::Acquire) == write {
                    return false;
                }
                continue;
            }

            if tag_of(current) == tag {
                if value_of(current) == EMPTY {
                    if cell
                        .compare_exchange(
                            current,
                            pack(tag, value),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        let _ = self.write.compare_exchange(
                            write,
                            write + 1,
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        );
                        return true;
                    }
                } else {
                    // Another producer installed here first.
                    let _ = self.write.compare_exchange(
                        write,
                        write + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                }
            }
            backoff.snooze();
        }
    }

    /// Remove the oldest value; returns `None` if the ring is empty
    pub fn try_pop(&self) -> Option<u32> {
        let capacity = self.cells.len() as u64;
        let backoff = Backoff::new();

        loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            let cell = &self.cells[(read & self.mask) as usize];
            let current = cell.load(Ordering::Acquire);
            let tag = read as u32;

            if read == write {
                if tag_of(current) == tag && value_of(current) != EMPTY {
                    // Installed, but its producer has not advanced the write index yet.
                    let _ = self.write.compare_exchange(
                        write,
                        write + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                    continue;
                }
                if self.read.load(Ordering::Acquire) == read {
                    return None;
                }
                continue;
            }

            if tag_of(current) == tag && value_of(current) != EMPTY {
                let released = pack(read.wrapping_add(capacity) as u32, EMPTY);
                if cell
                    .compare_exchange(current, released, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let _ = self.read.compare_exchange(
                        read,
                        read + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                    return Some(value_of(current));
                }
            } else if tag_of(current) == read.wrapping_add(capacity) as u32 {
                // Another consumer claimed this cell first.
                let _ = self.read.compare_exchange(
                    read,
                    read + 1,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
            backoff.snooze();
        }
    }
}

impl std::fmt::Debug for IndexRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRing")
            .field("capacity", &self.capacity())
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("write", &self.write.load(Ordering::Relaxed))
            .finish()
    }
}
