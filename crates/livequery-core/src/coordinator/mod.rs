//! Query coordination.
//!
//! [`QueryCoordinator`] serializes every query and write against the store
//! behind one lock, publishes change descriptions on a [`ChangeBus`], and
//! re-runs live queries whose dependency pattern matches a published change.
//!
//! ```text
//! execution(action) ──► background: lock ─► action ─► unlock ─► bus.publish(desc)
//!                                                                     │
//! updatable(pattern, query, observer)                                 ▼
//!   caller: lock ─► query ─► observer      listener: pattern.matches(desc)?
//!                                                    │ reset debounce timer
//!                                                    ▼
//!                           background: lock ─► query ─► unlock
//!                                                    │
//!                           foreground: observer(result)
//! ```

mod execution;
mod live;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::ChangeBus;
use crate::change_set::DataDescription;
use crate::config::CoordinatorConfig;
use crate::error::{BoxError, Result};
use crate::metrics::{CoordinatorMetrics, MetricsSnapshot};
use crate::pattern::DependencyPattern;
use crate::scheduler::Scheduler;

pub use execution::{Execution, WriteExecutor, WriteOutcome};
pub use live::Subscription;

/// Coordinates store access, change notifications and live queries.
///
/// Cloning is cheap; clones share the same lock, bus and schedulers.
#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    background: Arc<dyn Scheduler>,
    foreground: Arc<dyn Scheduler>,
    config: CoordinatorConfig,
    lock: Mutex<()>,
    bus: ChangeBus,
    write_executor: Option<WriteExecutor>,
    metrics: CoordinatorMetrics,
    next_subscription_id: AtomicU64,
}

impl Inner {
    /// Run `f` while holding the store lock.
    ///
    /// The lock is not reentrant: `f` must not call back into the coordinator.
    fn locked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock();
        f()
    }

    /// Publish a description, skipping empty ones.
    fn publish(&self, description: &str) -> usize {
        if description.is_empty() {
            tracing::debug!("empty change description not published");
            return 0;
        }
        self.metrics.record_publish();
        self.bus.publish(description)
    }
}

/// Builder for a [`QueryCoordinator`].
pub struct CoordinatorBuilder {
    background: Arc<dyn Scheduler>,
    foreground: Arc<dyn Scheduler>,
    config: CoordinatorConfig,
    write_executor: Option<WriteExecutor>,
}

impl CoordinatorBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the debounce window.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    /// Wrap every write, e.g. in a store transaction.
    ///
    /// The executor receives the write body and must call it exactly once.
    /// The body returns `false` if the write failed; the executor should then
    /// roll back instead of committing. If the executor returns without
    /// calling the body, the execution fails with
    /// [`Error::WriteSkipped`](crate::Error::WriteSkipped) and nothing is published.
    pub fn write_executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(&mut dyn FnMut() -> bool) + Send + Sync + 'static,
    {
        self.write_executor = Some(Arc::new(executor));
        self
    }

    /// Build the coordinator.
    pub fn build(self) -> QueryCoordinator {
        tracing::debug!(
            debounce_ms = self.config.debounce.as_millis() as u64,
            write_executor = self.write_executor.is_some(),
            "query coordinator created"
        );
        QueryCoordinator {
            inner: Arc::new(Inner {
                background: self.background,
                foreground: self.foreground,
                config: self.config,
                lock: Mutex::new(()),
                bus: ChangeBus::new(),
                write_executor: self.write_executor,
                metrics: CoordinatorMetrics::new(),
                next_subscription_id: AtomicU64::new(1),
            }),
        }
    }
}

impl QueryCoordinator {
    /// Create a coordinator over two execution contexts.
    pub fn new(
        background: Arc<dyn Scheduler>,
        foreground: Arc<dyn Scheduler>,
        config: CoordinatorConfig,
    ) -> Self {
        Self::builder(background, foreground).config(config).build()
    }

    /// Start building a coordinator with the default configuration.
    pub fn builder(
        background: Arc<dyn Scheduler>,
        foreground: Arc<dyn Scheduler>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            background,
            foreground,
            config: CoordinatorConfig::default(),
            write_executor: None,
        }
    }

    /// Run a query on the calling thread while holding the store lock.
    ///
    /// Blocks until the lock is available. Errors are returned unchanged.
    pub fn query<R, E>(
        &self,
        query: impl FnOnce() -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let result = self.inner.locked(query);
        self.inner.metrics.record_query();
        result
    }

    /// Subscribe to a live query.
    ///
    /// The query runs once on the calling thread and its result is handed to
    /// `observer` before this returns. Afterwards every published change
    /// matching `pattern` (re)starts the debounce timer on the background
    /// scheduler; when it expires the query runs again under the lock and
    /// the result is delivered to `observer` on the foreground scheduler.
    ///
    /// Query failures are delivered as [`Error::Query`](crate::Error::Query) and do not end the
    /// subscription. Dropping the returned [`Subscription`] ends it.
    pub fn updatable<R, E, Q, O>(
        &self,
        pattern: DependencyPattern,
        query: Q,
        observer: O,
    ) -> Subscription
    where
        R: Send + 'static,
        E: Into<BoxError> + 'static,
        Q: FnMut() -> std::result::Result<R, E> + Send + 'static,
        O: FnMut(Result<R>) + Send + 'static,
    {
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        live::LiveQuery::subscribe(self.inner.clone(), id, pattern, query, observer)
    }

    /// Run a write on the background scheduler while holding the store lock.
    ///
    /// A [`WriteOutcome::Changed`] result is published once the lock is
    /// released; any other outcome, and any failure, publishes nothing. The
    /// returned [`Execution`] completes on the foreground scheduler.
    pub fn execution<A, E>(&self, action: A) -> Execution
    where
        A: FnOnce() -> std::result::Result<WriteOutcome, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        execution::spawn(self.inner.clone(), action)
    }

    /// Publish a change that happened outside [`execution`](Self::execution).
    ///
    /// Does not take the store lock. Returns the number of bus listeners
    /// reached; empty descriptions are not published.
    pub fn notify_data_change(&self, change: &impl DataDescription) -> usize {
        let description = change.description();
        tracing::debug!(description = %description, "external data change");
        self.inner.publish(&description)
    }

    /// Coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Number of active live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.bus.listener_count()
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl std::fmt::Debug for QueryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCoordinator")
            .field("config", &self.inner.config)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::{ChangeSet, DataPattern};
    use crate::scheduler::ManualScheduler;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const QUERY_RESULT: &str = "query_result";

    fn manual() -> (Arc<ManualScheduler>, Arc<ManualScheduler>, QueryCoordinator) {
        let background = Arc::new(ManualScheduler::new());
        let foreground = Arc::new(ManualScheduler::new());
        let coordinator = QueryCoordinator::new(
            background.clone(),
            foreground.clone(),
            CoordinatorConfig::new().with_debounce_ms(200),
        );
        (background, foreground, coordinator)
    }

    fn advance(background: &ManualScheduler, foreground: &ManualScheduler, ms: u64) {
        background.advance_by(Duration::from_millis(ms));
        foreground.advance_by(Duration::from_millis(ms));
    }

    #[test]
    fn test_query_runs_on_calling_thread() {
        let (_bg, _fg, coordinator) = manual();
        let caller = thread::current().id();

        let (result, query_thread) = coordinator
            .query(|| Ok::<_, Infallible>((QUERY_RESULT, thread::current().id())))
            .unwrap();

        assert_eq!(result, QUERY_RESULT);
        assert_eq!(query_thread, caller);
        assert_eq!(coordinator.metrics().queries, 1);
    }

    #[test]
    fn test_query_error_is_returned_and_lock_released() {
        let (_bg, _fg, coordinator) = manual();

        let err = coordinator
            .query(|| Err::<(), _>("boom".to_string()))
            .unwrap_err();
        assert_eq!(err, "boom");

        // A second query would deadlock if the lock had leaked.
        assert_eq!(coordinator.query(|| Ok::<_, Infallible>(1)).unwrap(), 1);
    }

    #[test]
    fn test_query_panic_releases_lock() {
        let (_bg, _fg, coordinator) = manual();

        let panicking = coordinator.clone();
        let outcome = thread::spawn(move || {
            panicking.query(|| -> std::result::Result<(), Infallible> { panic!("query panicked") })
        })
        .join();
        assert!(outcome.is_err());

        assert_eq!(coordinator.query(|| Ok::<_, Infallible>(2)).unwrap(), 2);
    }

    #[test]
    fn test_updatable_scenario() {
        let (background, foreground, coordinator) = manual();
        let counter = Arc::new(AtomicUsize::new(0));

        let queries = counter.clone();
        let _subscription = coordinator.updatable(
            ChangeSet::from_table("data").pattern(),
            move || {
                queries.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(QUERY_RESULT)
            },
            |_| {},
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let _write = coordinator.execution(|| Ok::<_, Infallible>(ChangeSet::from_table("data").into()));
        advance(&background, &foreground, 300);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let _write = coordinator.execution(|| Ok::<_, Infallible>(ChangeSet::from_table("other").into()));
        advance(&background, &foreground, 300);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notify_data_change_skips_empty() {
        let (_bg, _fg, coordinator) = manual();
        assert_eq!(coordinator.notify_data_change(&ChangeSet::empty()), 0);
        assert_eq!(coordinator.metrics().publishes, 0);
    }

    #[test]
    fn test_builder_debounce() {
        let background = Arc::new(ManualScheduler::new());
        let foreground = Arc::new(ManualScheduler::new());
        let coordinator = QueryCoordinator::builder(background, foreground)
            .debounce(Duration::from_millis(5))
            .build();
        assert_eq!(coordinator.config().debounce, Duration::from_millis(5));
    }
}
