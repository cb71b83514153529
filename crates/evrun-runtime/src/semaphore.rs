//! Semaphores
//!
//! Binary and counting semaphores with millisecond timed take. A timeout
//! of 0 polls; [`TIMEOUT_NEVER`] waits forever. A timed-out take fails
//! with [`Error::NoResource`], distinct from every other failure.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use evrun_core::error::{Error, Result};
use evrun_core::time::{TimeMs, TIMEOUT_NEVER};

#[derive(Debug)]
struct SemState {
    count: usize,
    max: usize,
}

/// Binary or counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemState>,
    cv: Condvar,
}

impl Semaphore {
    /// Binary semaphore, created taken: the first `take` blocks until
    /// somebody gives.
    pub fn binary() -> Semaphore {
        Semaphore {
            state: Mutex::new(SemState { count: 0, max: 1 }),
            cv: Condvar::new(),
        }
    }

    /// Counting semaphore holding up to `max` permits, starting with
    /// `initial`.
    pub fn counting(max: usize, initial: usize) -> Result<Semaphore> {
        if max == 0 || initial > max {
            return Err(Error::BadInput);
        }
        Ok(Semaphore {
            state: Mutex::new(SemState {
                count: initial,
                max,
            }),
            cv: Condvar::new(),
        })
    }

    /// Take a permit, blocking until one is available.
    pub fn take(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while state.count == 0 {
            state = self.cv.wait(state).unwrap();
        }
        state.count -= 1;
        Ok(())
    }

    /// Take a permit, giving up after `timeout_ms`.
    pub fn take_with_timeout(&self, timeout_ms: TimeMs) -> Result<()> {
        if timeout_ms == TIMEOUT_NEVER {
            return self.take();
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut state = self.state.lock().unwrap();
        while state.count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NoResource);
            }
            let (guard, _timed_out) = self.cv.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
        state.count -= 1;
        Ok(())
    }

    /// Release a permit. Giving past the maximum count fails with
    /// [`Error::BadState`].
    pub fn give(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.count == state.max {
            return Err(Error::BadState);
        }
        state.count += 1;
        drop(state);
        self.cv.notify_one();
        Ok(())
    }

    /// Release a permit from interrupt context. Never blocks beyond the
    /// brief internal critical section.
    pub fn give_from_isr(&self) -> Result<()> {
        self.give()
    }

    /// Permits currently available. May be stale immediately.
    pub fn count(&self) -> usize {
        self.state.lock().unwrap().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_binary_blocks_until_given() {
        let sem = Arc::new(Semaphore::binary());
        assert_eq!(sem.take_with_timeout(0).unwrap_err(), Error::NoResource);

        let sem2 = sem.clone();
        let giver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.give().unwrap();
        });

        sem.take().unwrap();
        giver.join().unwrap();
    }

    #[test]
    fn test_binary_give_at_max_fails() {
        let sem = Semaphore::binary();
        sem.give().unwrap();
        assert_eq!(sem.give().unwrap_err(), Error::BadState);
    }

    #[test]
    fn test_counting_initial_and_max() {
        assert_eq!(Semaphore::counting(0, 0).unwrap_err(), Error::BadInput);
        assert_eq!(Semaphore::counting(2, 3).unwrap_err(), Error::BadInput);

        let sem = Semaphore::counting(3, 2).unwrap();
        sem.take().unwrap();
        sem.take().unwrap();
        assert_eq!(sem.take_with_timeout(0).unwrap_err(), Error::NoResource);

        sem.give().unwrap();
        sem.give().unwrap();
        sem.give().unwrap();
        assert_eq!(sem.give().unwrap_err(), Error::BadState);
        assert_eq!(sem.count(), 3);
    }

    #[test]
    fn test_timed_take_expires() {
        let sem = Semaphore::counting(1, 0).unwrap();
        let start = Instant::now();
        assert!(sem.take_with_timeout(25).is_err());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_permits_hand_off_across_tasks() {
        let sem = Arc::new(Semaphore::counting(4, 0).unwrap());

        let takers: Vec<_> = (0..4)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || sem.take_with_timeout(500).is_ok())
            })
            .collect();

        for _ in 0..4 {
            sem.give_from_isr().unwrap();
        }
        for t in takers {
            assert!(t.join().unwrap());
        }
        assert_eq!(sem.count(), 0);
    }
}
