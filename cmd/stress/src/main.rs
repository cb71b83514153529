//! Stress test - many producers, one consumer, one pool
//!
//! Hammers a bounded event queue from several producer tasks drawing
//! pooled events, and reports throughput and drop counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use evrun::{Event, EventPool, EventQueue, Task, TaskPriority};

fn main() {
    println!("=== evrun queue stress ===\n");

    let total_posts: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);
    let producers = 4u64;

    println!(
        "{} producers, {} posts each, queue depth 256, pool of 64\n",
        producers,
        total_posts / producers
    );

    let queue = EventQueue::new(256).expect("event queue");
    let pool = EventPool::new(64).expect("event pool");

    let posted = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut tasks = Vec::new();
    for p in 0..producers {
        let queue = queue.clone();
        let pool = pool.clone();
        let posted = posted.clone();
        let dropped = dropped.clone();
        let quota = total_posts / producers;

        let task = Task::spawn(
            &format!("producer-{}", p),
            128 * 1024,
            TaskPriority::Normal,
            move || {
                let mut sent = 0;
                while sent < quota {
                    let Some(mut event) = pool.get_event() else {
                        evrun::yield_now();
                        continue;
                    };
                    event.set_payload(Box::new(sent));

                    match queue.post(Event::Pooled(event)) {
                        Ok(()) => {
                            sent += 1;
                            posted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(rejected) => {
                            // full queue hands the event back; recycle
                            // and retry the same message
                            if let Event::Pooled(event) = rejected.into_event() {
                                pool.recycle_event(event);
                            }
                            dropped.fetch_add(1, Ordering::Relaxed);
                            evrun::yield_now();
                        }
                    }
                }
            },
        )
        .expect("spawn producer");
        tasks.push(task);
    }

    // consume on the main task, recycling events back to the pool
    let mut received = 0u64;
    while received < total_posts {
        match queue.get_with_timeout(1_000) {
            Some(Event::Pooled(event)) => {
                pool.recycle_event(event);
                received += 1;
            }
            Some(_) => {}
            None => {
                if posted.load(Ordering::Relaxed) >= total_posts && queue.get_count() == 0 {
                    break;
                }
            }
        }
    }

    for task in tasks {
        task.join().expect("producer join");
    }

    let elapsed = start.elapsed();
    let ok = posted.load(Ordering::Relaxed);
    let lost = dropped.load(Ordering::Relaxed);
    println!("received {} events in {:?}", received, elapsed);
    println!("posted {} ok, {} retries on full queue", ok, lost);
    println!(
        "throughput: {:.0} events/sec",
        received as f64 / elapsed.as_secs_f64()
    );
    println!("pool events back on freelist: {}/{}", pool.available(), pool.capacity());

    println!("\n=== done ===");
}
