//! Tasks
//!
//! A task is a named, priority-ranked unit of execution on a host OS
//! thread. The host decides the preemption policy; priorities here are
//! declared intent, applied to the underlying thread on a best-effort
//! basis (on POSIX hosts raising priority usually needs privileges, and
//! failing to get it is not an error).

use std::thread::{self, JoinHandle};
use std::time::Duration;

use evrun_core::error::{Error, Result};
use evrun_core::evlog_debug;
use evrun_core::log::Region;
use evrun_core::time::TimeMs;

/// Task scheduling priority. Higher is more urgent. `Highest` is
/// reserved for short-lived, latency-critical tasks like the timer
/// scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Highest,
}

/// A named task running on a host thread.
pub struct Task {
    name: String,
    priority: TaskPriority,
    handle: Option<JoinHandle<()>>,
}

impl Task {
    /// Spawn a task.
    ///
    /// `stack_size` is the stack budget in bytes; the host owns the
    /// actual allocation. Fails with [`Error::NoResource`] when the host
    /// cannot create the thread.
    pub fn spawn<F>(name: &str, stack_size: usize, priority: TaskPriority, entry: F) -> Result<Task>
    where
        F: FnOnce() + Send + 'static,
    {
        let builder = thread::Builder::new()
            .name(name.to_string())
            .stack_size(stack_size);

        let handle = builder
            .spawn(move || {
                set_current_priority(priority);
                entry();
            })
            .map_err(|_| Error::NoResource)?;

        Ok(Task {
            name: name.to_string(),
            priority,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Change the task's scheduling priority, best-effort, at the host
    /// scheduler's convenience.
    pub fn set_priority(&mut self, priority: TaskPriority) {
        self.priority = priority;
        #[cfg(unix)]
        {
            use std::os::unix::thread::JoinHandleExt;

            if let Some(handle) = &self.handle {
                let (policy, sched_priority) = sched_params(priority);
                let param = libc::sched_param { sched_priority };
                let rc = unsafe {
                    libc::pthread_setschedparam(
                        handle.as_pthread_t() as libc::pthread_t,
                        policy,
                        &param,
                    )
                };
                if rc != 0 {
                    evlog_debug!(
                        Region::Task,
                        "priority {:?} not applied to task {} (errno {})",
                        priority,
                        self.name,
                        rc
                    );
                }
            }
        }
    }

    /// Wait for the task to finish. Most firmware tasks never return;
    /// this exists for tests and orderly teardown.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| Error::Failure),
            None => Ok(()),
        }
    }
}

/// Name of the calling task, if it has one.
pub fn current_name() -> Option<String> {
    thread::current().name().map(|n| n.to_string())
}

/// Block the calling task for at least `ms` milliseconds.
pub fn sleep_ms(ms: TimeMs) {
    thread::sleep(Duration::from_millis(ms as u64));
}

/// Ask the host scheduler to consider running another task. A hint, not
/// a suspension point.
pub fn yield_now() {
    thread::yield_now();
}

/// Low/Normal keep the default policy; High/Highest request round-robin
/// real-time scheduling, which the host may refuse.
#[cfg(unix)]
fn sched_params(priority: TaskPriority) -> (libc::c_int, libc::c_int) {
    match priority {
        TaskPriority::Low | TaskPriority::Normal => (libc::SCHED_OTHER, 0),
        TaskPriority::High => (libc::SCHED_RR, 1),
        TaskPriority::Highest => (libc::SCHED_RR, 2),
    }
}

/// Apply `priority` to the calling thread, best-effort.
pub(crate) fn set_current_priority(priority: TaskPriority) {
    #[cfg(unix)]
    {
        let (policy, sched_priority) = sched_params(priority);
        let param = libc::sched_param { sched_priority };
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
        if rc != 0 {
            evlog_debug!(
                Region::Task,
                "priority {:?} not applied to task {:?} (errno {})",
                priority,
                current_name(),
                rc
            );
        }
    }

    #[cfg(not(unix))]
    let _ = priority;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_spawn_runs_entry() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let task = Task::spawn("worker", 64 * 1024, TaskPriority::Normal, move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(task.name(), "worker");
        assert_eq!(task.priority(), TaskPriority::Normal);
        task.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_task_sees_its_name() {
        let task = Task::spawn("named-task", 64 * 1024, TaskPriority::Low, || {
            assert_eq!(current_name().as_deref(), Some("named-task"));
        })
        .unwrap();
        task.join().unwrap();
    }

    #[test]
    fn test_set_priority_is_best_effort() {
        let mut task = Task::spawn("repriod", 64 * 1024, TaskPriority::Low, || {
            sleep_ms(20);
        })
        .unwrap();

        // never fails, even when the host refuses the request
        task.set_priority(TaskPriority::High);
        assert_eq!(task.priority(), TaskPriority::High);
        task.join().unwrap();
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Highest);
    }

    #[test]
    fn test_sleep_ms_blocks() {
        let start = std::time::Instant::now();
        sleep_ms(15);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
