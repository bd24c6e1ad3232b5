//! Virtual-time scheduler for deterministic tests.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Pending, Scheduler, Task, TaskHandle};

/// A scheduler whose clock only moves when advanced.
///
/// Nothing runs until [`advance_by`](Self::advance_by),
/// [`advance_to`](Self::advance_to) or [`run_pending`](Self::run_pending) is
/// called. Tasks are executed on the thread that advances the clock, in due
/// time order and FIFO for equal due times. Tasks scheduled by a running task
/// are picked up within the same advance if they fall due before its target.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: BTreeMap<(Duration, u64), Pending>,
}

impl ManualScheduler {
    /// Create a scheduler with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Move the clock forward, running every task that falls due.
    pub fn advance_by(&self, delta: Duration) {
        let target = self.now() + delta;
        self.advance_to(target);
    }

    /// Move the clock to `target`, running every task that falls due.
    ///
    /// Targets in the past only run tasks that are already due.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let pending = {
                let mut state = self.state.lock();
                let target = target.max(state.now);
                let Some(entry) = state.queue.first_entry() else {
                    state.now = target;
                    break;
                };
                let (due, _) = *entry.key();
                if due > target {
                    state.now = target;
                    break;
                }
                let pending = entry.remove();
                state.now = due;
                pending
            };
            pending.run();
        }
    }

    /// Run every task that is due at the current time.
    pub fn run_pending(&self) {
        let now = self.now();
        self.advance_to(now);
    }

    /// Number of queued tasks that have not been cancelled.
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        let (pending, handle) = Pending::new(task);
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert((due, seq), pending);
        handle
    }
}
