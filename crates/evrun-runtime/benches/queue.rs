//! Event queue throughput benchmarks.

use criterion::{criterion_group, criterion_main, Criterion};

use evrun_runtime::{Event, EventQueue, EventType, UserEvent};

fn bench_post_get(c: &mut Criterion) {
    let queue = EventQueue::new(1024).unwrap();

    c.bench_function("queue_post_get", |b| {
        b.iter(|| {
            queue
                .post(Event::User(UserEvent::new(EventType::user(0))))
                .unwrap();
            queue.get_with_timeout(0).unwrap();
        })
    });
}

fn bench_post_get_batch(c: &mut Criterion) {
    let queue = EventQueue::new(1024).unwrap();

    c.bench_function("queue_post_get_batch_64", |b| {
        b.iter(|| {
            for _ in 0..64 {
                queue
                    .post(Event::User(UserEvent::new(EventType::user(0))))
                    .unwrap();
            }
            while queue.get_with_timeout(0).is_some() {}
        })
    });
}

criterion_group!(benches, bench_post_get, bench_post_get_batch);
criterion_main!(benches);
