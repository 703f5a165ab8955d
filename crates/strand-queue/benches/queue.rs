//! Transaction queue throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;
use strand_queue::TransactionQueue;

fn single_thread_roundtrip(c: &mut Criterion) {
    let queue = TransactionQueue::new(64);
    c.bench_function("push_pop_single_thread", |b| {
        b.iter(|| {
            queue.push(black_box(42u64), false).unwrap();
            black_box(queue.pop(false).unwrap().complete());
        })
    });
}

fn contended_handoff(c: &mut Criterion) {
    c.bench_function("push_pop_4x4_threads_10k", |b| {
        b.iter(|| {
            let queue = Arc::new(TransactionQueue::new(256));
            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..2500u64 {
                            queue.push(i, true).unwrap();
                        }
                    })
                })
                .collect();
            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for _ in 0..2500 {
                            black_box(queue.pop(true).unwrap().complete());
                        }
                    })
                })
                .collect();
            for handle in producers.into_iter().chain(consumers) {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, single_thread_roundtrip, contended_handoff);
criterion_main!(benches);
