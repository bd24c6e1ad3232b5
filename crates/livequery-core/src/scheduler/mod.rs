//! Execution contexts for background work and result delivery.
//!
//! The coordinator never spawns threads itself. It is handed two
//! [`Scheduler`]s: a background one for writes, debounce timers and
//! re-queries, and a foreground one for delivering results.
//!
//! Two implementations ship with the crate:
//!
//! - [`WorkerScheduler`] runs tasks on a dedicated, named OS thread.
//! - [`ManualScheduler`] runs tasks against a virtual clock that only moves
//!   when told to, for deterministic tests.

mod manual;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use manual::ManualScheduler;
pub use worker::WorkerScheduler;

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context able to run immediate and delayed work.
///
/// Tasks due at the same instant run in the order they were scheduled.
pub trait Scheduler: Send + Sync {
    /// Run a task as soon as possible.
    fn schedule(&self, task: Task) -> TaskHandle {
        self.schedule_after(Duration::ZERO, task)
    }

    /// Run a task once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle;
}

/// Cancellation token for a scheduled task.
///
/// A cancelled task is skipped when it comes due. Cancelling a task that is
/// already running has no effect on that run.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Create a live handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that is already cancelled.
    pub(crate) fn cancelled() -> Self {
        let handle = Self::new();
        handle.cancel();
        handle
    }

    /// Prevent the task from running.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A task waiting in a scheduler queue.
struct Pending {
    task: Task,
    handle: TaskHandle,
}

impl Pending {
    fn new(task: Task) -> (Self, TaskHandle) {
        let handle = TaskHandle::new();
        (
            Self {
                task,
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Run the task unless it was cancelled while queued.
    fn run(self) {
        if !self.handle.is_cancelled() {
            (self.task)();
        }
    }
}
