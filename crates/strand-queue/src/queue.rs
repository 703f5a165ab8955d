//! Transaction queue implementation

use crate::error::{QueueError, QueueResult};
use crate::ring::IndexRing;
use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use strand_sync::Semaphore;

/// One fixed transaction slot
struct Slot<T> {
    /// Payload, present while the slot is queued
    payload: Mutex<Option<T>>,
    /// Completion generation, bumped each time the slot's transaction completes
    generation: Mutex<u64>,
    /// Signaled on completion
    completed: Condvar,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            payload: Mutex::new(None),
            generation: Mutex::new(0),
            completed: Condvar::new(),
        }
    }
}

/// Receipt for a pushed transaction, used to join on its completion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionTicket {
    slot: usize,
    generation: u64,
}

impl TransactionTicket {
    /// Index of the slot holding the transaction
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Lock-free bounded transaction queue
///
/// A fixed pool of `capacity` slots circulates between a free ring and a
/// ready ring. A slot is owned by exactly one of {producer, queue, consumer}
/// at a time: the producer between claiming it from the free ring and
/// publishing it on the ready ring, the consumer from popping it until
/// [`Transaction::complete`].
pub struct TransactionQueue<T> {
    slots: Box<[Slot<T>]>,
    free: IndexRing,
    ready: IndexRing,
    free_permits: Semaphore,
    data_permits: Semaphore,
    aborted: AtomicBool,
}

impl<T: Send> TransactionQueue<T> {
    /// Create a queue with `capacity` transaction slots
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a non-zero power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "transaction queue capacity must be a non-zero power of two, got {capacity}"
        );
        Self {
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            free: IndexRing::full(capacity),
            ready: IndexRing::new(capacity),
            free_permits: Semaphore::new(capacity),
            data_permits: Semaphore::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    /// Fixed number of transaction slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of published transactions not yet popped
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Check if no transaction is waiting to be popped
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Whether [`abort`](Self::abort) has been called
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Publish `payload` as a new transaction
    ///
    /// In non-blocking mode returns [`QueueError::WouldBlock`] when every slot
    /// is in use. Blocking mode waits for a free slot or an abort.
    pub fn push(&self, payload: T, blocking: bool) -> QueueResult<TransactionTicket> {
        if self.is_aborted() {
            return Err(QueueError::Aborted);
        }
        Self::acquire(&self.free_permits, blocking)?;
        if self.is_aborted() {
            // Pass the sentinel on to the next waiter.
            self.free_permits.signal();
            return Err(QueueError::Aborted);
        }

        let slot = Self::claim(&self.free);
        let generation = {
            *self.slots[slot].payload.lock() = Some(payload);
            *self.slots[slot].generation.lock()
        };

        let backoff = Backoff::new();
        while !self.ready.try_push(slot as u32) {
            backoff.snooze();
        }
        self.data_permits.signal();

        Ok(TransactionTicket { slot, generation })
    }

    /// Take the oldest transaction
    ///
    /// In non-blocking mode returns [`QueueError::WouldBlock`] when nothing is
    /// queued. Blocking mode waits for data or an abort.
    pub fn pop(&self, blocking: bool) -> QueueResult<Transaction<'_, T>> {
        if self.is_aborted() {
            return Err(QueueError::Aborted);
        }
        Self::acquire(&self.data_permits, blocking)?;
        if self.is_aborted() {
            self.data_permits.signal();
            return Err(QueueError::Aborted);
        }

        let slot = Self::claim(&self.ready);
        let payload = self.slots[slot].payload.lock().take();
        Ok(Transaction {
            queue: self,
            slot,
            payload,
            completed: false,
        })
    }

    /// Unblock every waiter; all later pushes and pops return `Aborted`
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Aborting transaction queue (capacity {})", self.capacity());
        self.free_permits.signal();
        self.data_permits.signal();
    }

    /// Block until the transaction behind `ticket` has completed
    pub fn wait(&self, ticket: &TransactionTicket) {
        let slot = &self.slots[ticket.slot];
        let mut generation = slot.generation.lock();
        while *generation == ticket.generation {
            slot.completed.wait(&mut generation);
        }
    }

    /// Whether the transaction behind `ticket` has completed
    pub fn is_complete(&self, ticket: &TransactionTicket) -> bool {
        *self.slots[ticket.slot].generation.lock() != ticket.generation
    }

    fn acquire(permits: &Semaphore, blocking: bool) -> QueueResult<()> {
        if blocking {
            permits.wait();
            Ok(())
        } else if permits.poll() {
            Ok(())
        } else {
            Err(QueueError::WouldBlock)
        }
    }

    /// Take an index from a ring the caller holds a permit for
    fn claim(ring: &IndexRing) -> usize {
        let backoff = Backoff::new();
        loop {
            if let Some(slot) = ring.try_pop() {
                return slot as usize;
            }
            backoff.snooze();
        }
    }

    fn finish(&self, slot: usize) {
        {
            let state = &self.slots[slot];
            let mut generation = state.generation.lock();
            *generation += 1;
            state.completed.notify_all();
        }
        let backoff = Backoff::new();
        while !self.free.try_push(slot as u32) {
            backoff.snooze();
        }
        self.free_permits.signal();
    }
}

impl<T> std::fmt::Debug for TransactionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionQueue")
            .field("capacity", &self.slots.len())
            .field("ready", &self.ready.len())
            .field("aborted", &self.aborted.load(Ordering::Relaxed))
            .finish()
    }
}

/// A popped transaction
///
/// Owns its slot until [`complete`](Self::complete) is called or the guard is
/// dropped; either way the completion signal fires and the slot is recycled.
pub struct Transaction<'a, T: Send> {
    queue: &'a TransactionQueue<T>,
    slot: usize,
    payload: Option<T>,
    completed: bool,
}

impl<T: Send> Transaction<'_, T> {
    /// Slot index of this transaction
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The transaction payload
    pub fn payload(&self) -> &T {
        self.payload
            .as_ref()
            .expect("transaction payload is present until completion")
    }

    /// Mutable access to the payload
    pub fn payload_mut(&mut self) -> &mut T {
        self.payload
            .as_mut()
            .expect("transaction payload is present until completion")
    }

    /// Mark the transaction complete, returning its payload
    pub fn complete(mut self) -> T {
        let payload = self
            .payload
            .take()
            .expect("transaction payload is present until completion");
        self.completed = true;
        self.queue.finish(self.slot);
        payload
    }
}

impl<T: Send> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if !self.completed {
            self.queue.finish(self.slot);
        }
    }
}
