//! Live query subscriptions.
//!
//! Each subscription is a small state machine:
//!
//! ```text
//! subscribe ─► immediate emit ─► Listening ◄──────────────┐
//!                                   │ matching change      │ timer fired:
//!                                   ▼                      │ re-query, deliver
//!                             DebouncePending ─────────────┘
//!                                   │ matching change: cancel timer, re-arm
//!                                   ▼
//!                             DebouncePending
//!
//! unsubscribe (any state) ─► Cancelled
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::Inner;
use crate::bus::ListenerId;
use crate::error::{BoxError, Error, Result};
use crate::pattern::DependencyPattern;
use crate::scheduler::TaskHandle;

type BoxedQuery<R> = Box<dyn FnMut() -> Result<R> + Send>;
type BoxedObserver<R> = Box<dyn FnMut(Result<R>) + Send>;

enum Phase {
    Listening,
    DebouncePending(TaskHandle),
    Cancelled,
}

struct LiveState {
    phase: Phase,
    /// Bumped whenever the debounce timer is re-armed, so a timer that was
    /// superseded while already running does not clear its successor.
    generation: u64,
}

pub(crate) struct LiveQuery<R> {
    id: u64,
    inner: Arc<Inner>,
    pattern: DependencyPattern,
    query: Mutex<BoxedQuery<R>>,
    observer: Mutex<BoxedObserver<R>>,
    state: Mutex<LiveState>,
    listener: Mutex<Option<ListenerId>>,
}

impl<R: Send + 'static> LiveQuery<R> {
    /// Register a live query and emit its first result on the calling thread.
    pub(crate) fn subscribe<E, Q, O>(
        inner: Arc<Inner>,
        id: u64,
        pattern: DependencyPattern,
        mut query: Q,
        observer: O,
    ) -> Subscription
    where
        E: Into<BoxError> + 'static,
        Q: FnMut() -> std::result::Result<R, E> + Send + 'static,
        O: FnMut(Result<R>) + Send + 'static,
    {
        let live = Arc::new(Self {
            id,
            inner,
            pattern,
            query: Mutex::new(Box::new(move || query().map_err(Error::query))),
            observer: Mutex::new(Box::new(observer)),
            state: Mutex::new(LiveState {
                phase: Phase::Listening,
                generation: 0,
            }),
            listener: Mutex::new(None),
        });

        // Hold the observer until the immediate result is delivered so no
        // live update can overtake it.
        let mut observer = live.observer.lock();

        let weak = Arc::downgrade(&live);
        let listener_id = live.inner.bus.subscribe(Arc::new(move |description: &str| {
            if let Some(live) = weak.upgrade() {
                live.on_change(description);
            }
        }));
        *live.listener.lock() = Some(listener_id);

        // Created before the immediate emission so a panicking query or
        // observer still unregisters the listener while unwinding.
        let subscription = Subscription { live: live.clone() };

        let result = live.run_query();
        live.inner.metrics.record_query();
        (*observer)(result);
        drop(observer);

        tracing::debug!(
            subscription_id = id,
            pattern = live.pattern.as_str(),
            "live query subscribed"
        );

        subscription
    }

    fn run_query(&self) -> Result<R> {
        let mut query = self.query.lock();
        self.inner.locked(|| (*query)())
    }

    /// Bus listener: re-arm the debounce timer on a matching change.
    fn on_change(self: &Arc<Self>, description: &str) {
        if !self.pattern.matches(description) {
            return;
        }

        let mut state = self.state.lock();
        match &state.phase {
            Phase::Cancelled => return,
            Phase::DebouncePending(timer) => timer.cancel(),
            Phase::Listening => {}
        }

        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = self.inner.background.schedule_after(
            self.inner.config.debounce,
            Box::new(move || {
                if let Some(live) = weak.upgrade() {
                    live.on_debounce_elapsed(generation);
                }
            }),
        );
        state.phase = Phase::DebouncePending(timer);

        tracing::trace!(
            subscription_id = self.id,
            description,
            generation,
            "debounce timer armed"
        );
    }

    /// Background: the quiet period passed, run the query again.
    fn on_debounce_elapsed(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            let current =
                matches!(state.phase, Phase::DebouncePending(_)) && state.generation == generation;
            if !current {
                // Cancelled, or superseded by a newer timer.
                return;
            }
            state.phase = Phase::Listening;
        }

        let result = self.run_query();
        self.inner.metrics.record_requery();

        let live = self.clone();
        self.inner
            .foreground
            .schedule(Box::new(move || live.deliver(result)));
    }

    /// Foreground: hand a re-query result to the observer.
    fn deliver(&self, result: Result<R>) {
        let mut observer = self.observer.lock();
        if self.is_cancelled() {
            self.inner.metrics.record_dropped_delivery();
            tracing::trace!(subscription_id = self.id, "result dropped after unsubscribe");
            return;
        }
        if let Err(e) = &result {
            tracing::debug!(subscription_id = self.id, error = %e, "live query failed");
        }
        (*observer)(result);
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Cancelled)
    }
}

/// Type-erased view of a live query, held by [`Subscription`].
trait LiveHandle: Send + Sync {
    fn id(&self) -> u64;
    fn cancel(&self) -> bool;
    fn is_active(&self) -> bool;
}

impl<R: Send + 'static> LiveHandle for LiveQuery<R> {
    fn id(&self) -> u64 {
        self.id
    }

    fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.phase, Phase::Cancelled) {
                Phase::Cancelled => return false,
                Phase::DebouncePending(timer) => timer.cancel(),
                Phase::Listening => {}
            }
        }

        if let Some(listener_id) = self.listener.lock().take() {
            self.inner.bus.unsubscribe(listener_id);
        }
        tracing::debug!(subscription_id = self.id, "live query unsubscribed");
        true
    }

    fn is_active(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Handle to a live query created by `QueryCoordinator::updatable`.
///
/// Dropping the handle unsubscribes: the pending debounce timer is cancelled
/// and a re-query already in flight finishes without being delivered.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    live: Arc<dyn LiveHandle>,
}

impl Subscription {
    /// Subscription id, unique per coordinator.
    pub fn id(&self) -> u64 {
        self.live.id()
    }

    /// Check whether results are still being delivered.
    pub fn is_active(&self) -> bool {
        self.live.is_active()
    }

    /// Stop receiving results.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.live.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}
