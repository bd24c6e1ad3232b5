//! Dedicated-thread scheduler.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Pending, Scheduler, Task, TaskHandle};
use crate::error::Result;

/// Scheduler backed by a single named worker thread.
///
/// Tasks run one at a time in deadline order, FIFO among equal deadlines.
/// Stopping the worker drops everything still queued.
pub struct WorkerScheduler {
    name: String,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    queue: Mutex<WorkerQueue>,
    ready: Condvar,
    shutdown: AtomicBool,
}

#[derive(Default)]
struct WorkerQueue {
    next_seq: u64,
    timers: BTreeMap<(Instant, u64), Pending>,
}

impl WorkerScheduler {
    /// Start a worker thread with the given name.
    pub fn start(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new(Shared {
            queue: Mutex::new(WorkerQueue::default()),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::worker_loop(&worker_shared))?;

        tracing::debug!(scheduler = %name, "worker scheduler started");

        Ok(Self {
            name,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker and wait for it to finish its current task.
    ///
    /// Queued tasks are dropped without running.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        {
            // Pair the flag with the queue lock so a waiting worker cannot miss it.
            let _queue = self.shared.queue.lock();
            self.shared.ready.notify_all();
        }

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Stopped from one of its own tasks; the loop exits after this task.
            return;
        }
        let _ = handle.join();

        let leftover = std::mem::take(&mut self.shared.queue.lock().timers);
        let dropped = leftover.len();
        drop(leftover);
        tracing::debug!(scheduler = %self.name, dropped, "worker scheduler stopped");
    }

    /// Check if the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn worker_loop(shared: &Shared) {
        let mut queue = shared.queue.lock();
        loop {
            if shared.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let next_due = queue.timers.keys().next().map(|&(due, _)| due);
            match next_due {
                None => {
                    shared.ready.wait(&mut queue);
                }
                Some(due) if due > Instant::now() => {
                    shared.ready.wait_until(&mut queue, due);
                }
                Some(_) => {
                    let Some((_, pending)) = queue.timers.pop_first() else {
                        continue;
                    };
                    // Run without holding the queue so tasks can schedule more work.
                    let outcome = parking_lot::MutexGuard::unlocked(&mut queue, || {
                        panic::catch_unwind(AssertUnwindSafe(|| pending.run()))
                    });
                    if outcome.is_err() {
                        tracing::error!(
                            scheduler = thread::current().name().unwrap_or("worker"),
                            "scheduled task panicked"
                        );
                    }
                }
            }
        }
    }
}

impl Scheduler for WorkerScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            tracing::warn!(scheduler = %self.name, "task scheduled on a stopped worker was dropped");
            return TaskHandle::cancelled();
        }

        let (pending, handle) = Pending::new(task);
        let due = Instant::now() + delay;
        {
            let mut queue = self.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.timers.insert((due, seq), pending);
        }
        self.shared.ready.notify_one();
        handle
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_runs_tasks_in_fifo_order() {
        let scheduler = WorkerScheduler::start("test-fifo").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            scheduler.schedule(Box::new(move || tx.send(i).unwrap()));
        }

        let received: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_runs_on_named_thread() {
        let scheduler = WorkerScheduler::start("test-named").unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(Box::new(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        }));

        let name = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(name.as_deref(), Some("test-named"));
    }

    #[test]
    fn test_delayed_task_waits() {
        let scheduler = WorkerScheduler::start("test-delay").unwrap();
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();

        scheduler.schedule_after(
            Duration::from_millis(30),
            Box::new(move || tx.send(Instant::now()).unwrap()),
        );

        let ran_at = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(ran_at.duration_since(started) >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancelled_task_does_not_run() {
        let scheduler = WorkerScheduler::start("test-cancel").unwrap();
        let (tx, rx) = mpsc::channel();

        let cancelled_tx = tx.clone();
        let handle = scheduler.schedule_after(
            Duration::from_millis(20),
            Box::new(move || cancelled_tx.send("cancelled").unwrap()),
        );
        handle.cancel();
        scheduler.schedule_after(
            Duration::from_millis(40),
            Box::new(move || tx.send("kept").unwrap()),
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "kept");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_survives_panicking_task() {
        let scheduler = WorkerScheduler::start("test-panic").unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(Box::new(|| panic!("task failed")));
        scheduler.schedule(Box::new(move || tx.send("after").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "after");
        assert!(scheduler.is_running());
    }

    #[test]
    fn test_stop_drops_queued_work() {
        let scheduler = WorkerScheduler::start("test-stop").unwrap();
        assert!(scheduler.is_running());

        scheduler.stop();
        assert!(!scheduler.is_running());

        let handle = scheduler.schedule(Box::new(|| {}));
        assert!(handle.is_cancelled());
    }
}
