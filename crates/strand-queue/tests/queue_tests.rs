//! Integration tests for strand-queue
//!
//! Tests cover:
//! - Multi-producer / multi-consumer delivery (no loss, no duplication)
//! - FIFO order against a sequential model (property based)
//! - Blocking push released by completions

use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use strand_queue::{QueueError, TransactionQueue};

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_every_payload_popped_exactly_once() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: usize = 2500;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(TransactionQueue::new(32));
    let popped = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push(p * PER_PRODUCER + i, true).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    match queue.pop(true) {
                        Ok(tr) => {
                            seen.push(tr.complete());
                            if popped.fetch_add(1, Ordering::SeqCst) + 1 == TOTAL {
                                queue.abort();
                            }
                        }
                        Err(QueueError::Aborted) => break,
                        Err(QueueError::WouldBlock) => unreachable!("blocking pop"),
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = Vec::with_capacity(TOTAL);
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }

    assert_eq!(all.len(), TOTAL);
    let unique: HashSet<usize> = all.into_iter().collect();
    assert_eq!(unique.len(), TOTAL);
}

#[test]
fn test_blocking_push_resumes_after_completion() {
    let queue = Arc::new(TransactionQueue::new(2));
    queue.push(0u32, false).unwrap();
    queue.push(1u32, false).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push(2, true).is_ok())
    };

    let tr = queue.pop(true).unwrap();
    assert_eq!(tr.complete(), 0);

    assert!(producer.join().unwrap());
    assert_eq!(queue.pop(true).unwrap().complete(), 1);
    assert_eq!(queue.pop(true).unwrap().complete(), 2);
}

// ============================================================================
// Sequential model
// ============================================================================

#[derive(Clone, Debug)]
enum Op {
    Push(u16),
    Pop,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u16>().prop_map(Op::Push), Just(Op::Pop)]
}

proptest! {
    #[test]
    fn test_matches_fifo_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let queue = TransactionQueue::new(8);
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    let result = queue.push(value, false);
                    if model.len() == queue.capacity() {
                        prop_assert_eq!(result.unwrap_err(), QueueError::WouldBlock);
                    } else {
                        prop_assert!(result.is_ok());
                        model.push_back(value);
                    }
                }
                Op::Pop => match queue.pop(false) {
                    Ok(tr) => prop_assert_eq!(Some(tr.complete()), model.pop_front()),
                    Err(err) => {
                        prop_assert_eq!(err, QueueError::WouldBlock);
                        prop_assert!(model.is_empty());
                    }
                },
            }
            prop_assert_eq!(queue.len(), model.len());
        }
    }
}
