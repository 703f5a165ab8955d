//! # strand-sync
//!
//! Synchronization primitives shared by the Strand job system and resource
//! pipeline.
//!
//! This crate provides:
//! - [`Event`]: binary event, manual or auto reset, blocking wait + poll
//! - [`Semaphore`]: counting semaphore with blocking and non-blocking acquire
//! - [`SpinLock`]: short-critical-section lock for counter updates

#![warn(missing_docs)]
#![warn(clippy::all)]

mod event;
mod semaphore;
mod spin_lock;

pub use event::{Event, EventMode};
pub use semaphore::Semaphore;
pub use spin_lock::{SpinLock, SpinLockGuard};
