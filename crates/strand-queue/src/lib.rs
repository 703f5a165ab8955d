//! # strand-queue
//!
//! Lock-free bounded transaction queue for Strand.
//!
//! This crate provides:
//! - A fixed-capacity ring of slot indices claimed by compare-and-swap
//! - Transaction slots pairing a payload with a completion signal
//! - Semaphore-backed blocking push/pop with an abort mode
//!
//! ## Architecture
//!
//! ```text
//!   producer                                   consumer
//!      |  free permit                              |  data permit
//!      v                                           v
//! +-----------+   slot index   +-----------+   slot index
//! | free ring | -------------> | ready ring| -------------> Transaction
//! +-----------+                +-----------+                  |
//!      ^                                                      |
//!      +---------------- complete(): recycle ------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use strand_queue::TransactionQueue;
//!
//! let queue = TransactionQueue::new(64);
//! let ticket = queue.push(job_id, true)?;
//! let tr = queue.pop(true)?;
//! tr.complete();
//! queue.wait(&ticket);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod queue;
mod ring;

pub use error::{QueueError, QueueResult};
pub use queue::{Transaction, TransactionQueue, TransactionTicket};
pub use ring::IndexRing;
