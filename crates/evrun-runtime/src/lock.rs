//! Locks
//!
//! Binary and recursive blocking locks with millisecond timed acquire.
//! All of the usual caveats apply: locks beget deadlocks, use with care
//! and avoid unless necessary. Release is by RAII guard.
//!
//! A timeout of 0 polls; [`TIMEOUT_NEVER`] waits forever. A timed-out
//! acquire fails with [`Error::NoResource`], distinct from every other
//! failure.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use evrun_core::error::{Error, Result};
use evrun_core::time::{TimeMs, TIMEOUT_NEVER};

/// Binary blocking lock.
#[derive(Debug)]
pub struct Lock {
    locked: Mutex<bool>,
    cv: Condvar,
}

/// Holds a [`Lock`]; released on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Lock {
    pub fn new() -> Lock {
        Lock {
            locked: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Enter the exclusion section, blocking until available.
    pub fn enter(&self) -> LockGuard<'_> {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.cv.wait(locked).unwrap();
        }
        *locked = true;
        LockGuard { lock: self }
    }

    /// Enter the exclusion section, giving up after `timeout_ms`.
    pub fn enter_with_timeout(&self, timeout_ms: TimeMs) -> Result<LockGuard<'_>> {
        if timeout_ms == TIMEOUT_NEVER {
            return Ok(self.enter());
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NoResource);
            }
            let (guard, _timed_out) = self.cv.wait_timeout(locked, deadline - now).unwrap();
            locked = guard;
        }
        *locked = true;
        Ok(LockGuard { lock: self })
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.lock.locked.lock().unwrap();
        *locked = false;
        drop(locked);
        self.lock.cv.notify_one();
    }
}

struct RecursiveState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Re-entrant blocking lock. The owning task may enter again without
/// deadlocking; the lock releases when every guard is dropped.
pub struct RecursiveLock {
    state: Mutex<RecursiveState>,
    cv: Condvar,
}

/// Holds a [`RecursiveLock`]; one nesting level released on drop.
pub struct RecursiveLockGuard<'a> {
    lock: &'a RecursiveLock,
}

impl RecursiveLock {
    pub fn new() -> RecursiveLock {
        RecursiveLock {
            state: Mutex::new(RecursiveState {
                owner: None,
                depth: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Enter the exclusion section, blocking until available.
    pub fn enter(&self) -> RecursiveLockGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some() && state.owner != Some(me) {
            state = self.cv.wait(state).unwrap();
        }
        state.owner = Some(me);
        state.depth += 1;
        RecursiveLockGuard { lock: self }
    }

    /// Enter the exclusion section, giving up after `timeout_ms`.
    pub fn enter_with_timeout(&self, timeout_ms: TimeMs) -> Result<RecursiveLockGuard<'_>> {
        if timeout_ms == TIMEOUT_NEVER {
            return Ok(self.enter());
        }

        let me = thread::current().id();
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some() && state.owner != Some(me) {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NoResource);
            }
            let (guard, _timed_out) = self.cv.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
        state.owner = Some(me);
        state.depth += 1;
        Ok(RecursiveLockGuard { lock: self })
    }
}

impl Default for RecursiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecursiveLockGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.lock.cv.notify_one();
        }
    }
}
