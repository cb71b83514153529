//! One-shot and repeating timer example
//!
//! Arms a one-shot timer and a repeating timer against the same queue
//! and prints every delivery with its validity.

use std::time::Instant;

use evrun::{EventQueue, TimerConfig, TimerService};

fn main() {
    println!("=== evrun timer example ===\n");

    evrun::init_logging();

    let service = TimerService::start(TimerConfig::default()).expect("timer service");
    let queue = EventQueue::new(8).expect("event queue");

    let oneshot = service.new_timer(None, &queue);
    let ticker = service.new_timer(None, &queue);

    let started = Instant::now();
    oneshot.start(450, false).expect("arm one-shot");
    ticker.start(125, true).expect("arm ticker");
    println!("armed: one-shot @450ms, ticker @125ms repeating\n");

    let mut ticks = 0;
    loop {
        let Some(event) = queue.get_with_timeout(2_000) else {
            println!("queue went quiet, done");
            break;
        };
        let at = started.elapsed().as_millis();

        if oneshot.matches(&event) {
            println!("[{:4} ms] one-shot fired (valid: {})", at, oneshot.is_valid());
        } else if ticker.matches(&event) {
            let valid = ticker.is_valid();
            if valid {
                ticks += 1;
                println!("[{:4} ms] tick {}", at, ticks);
            } else {
                println!("[{:4} ms] stale tick ignored", at);
            }
            if ticks == 8 {
                println!("\ncancelling ticker after {} ticks", ticks);
                ticker.cancel();
            }
        }

        if ticks >= 8 && queue.get_count() == 0 {
            // one more poll to pick up a final in-flight delivery
            if let Some(event) = queue.get_with_timeout(300) {
                if ticker.matches(&event) && !ticker.is_valid() {
                    println!("[{:4} ms] post-cancel tick ignored", started.elapsed().as_millis());
                }
            }
            break;
        }
    }

    match service.wake_time() {
        evrun::TIME_NEVER_NATIVE => println!("\nno pending wake"),
        at => println!("\nnext wake at native tick {}", at),
    }
    println!("=== done ===");
}
