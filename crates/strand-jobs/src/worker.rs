//! Worker and scheduler thread loops

use crate::manager::Shared;
use std::cell::Cell;
use std::sync::Arc;
use strand_queue::QueueError;

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is one of a manager's workers
///
/// Workers must never block on a full queue: they may be the only consumer
/// of it.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

/// Worker loop: pop, execute, complete, notify dependents, dispatch
pub(crate) fn run_worker(shared: Arc<Shared>, index: usize) {
    ON_WORKER.with(|flag| flag.set(true));
    tracing::debug!("Worker {} started", index);

    let queue = &shared.queues[index];
    loop {
        let tr = match queue.pop(true) {
            Ok(tr) => tr,
            Err(QueueError::Aborted) => break,
            Err(QueueError::WouldBlock) => continue,
        };
        let id = *tr.payload();
        let node = shared.execute(id);
        tr.complete();

        if let Some(node) = node {
            shared.fire(id, node);
        }
        if shared.is_stopping() {
            break;
        }
        shared.do_scheduling(false);
    }

    tracing::debug!("Worker {} stopped", index);
}

/// Scheduler loop: dispatch ready jobs with blocking pushes when signaled
///
/// Picks up work that workers could not place without blocking.
pub(crate) fn run_scheduler(shared: Arc<Shared>) {
    tracing::debug!("Scheduler thread started");
    loop {
        shared.scheduler_signal.wait();
        if shared.is_stopping() {
            break;
        }
        shared.do_scheduling(true);
    }
    tracing::debug!("Scheduler thread stopped");
}
