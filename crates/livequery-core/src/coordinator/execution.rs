//! Write executions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::Inner;
use crate::change_set::{ChangeSet, DataDescription};
use crate::error::{BoxError, Error, Result};

/// Hook wrapping every write body, e.g. in a store transaction.
///
/// The body returns `true` when the write succeeded and `false` when it
/// failed, so the hook can commit or roll back.
pub type WriteExecutor = Arc<dyn Fn(&mut dyn FnMut() -> bool) + Send + Sync>;

/// What a write reports about its effect on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write changed these resources; their description is published.
    Changed(ChangeSet),
    /// The write changed nothing observable. Nothing is published.
    NoChange,
    /// The write does not describe its changes. Nothing is published; the
    /// caller is expected to call `notify_data_change` itself.
    Unreported,
}

impl From<ChangeSet> for WriteOutcome {
    fn from(set: ChangeSet) -> Self {
        WriteOutcome::Changed(set)
    }
}

impl From<()> for WriteOutcome {
    fn from(_: ()) -> Self {
        WriteOutcome::Unreported
    }
}

/// Completion signal of a write scheduled with `execution`.
///
/// Resolves on the foreground scheduler once the write, and its publish,
/// have finished. Await it, block on it with [`wait`](Self::wait), or poll it
/// with [`try_result`](Self::try_result). Dropping it does not cancel the
/// write.
#[derive(Debug)]
#[must_use = "an Execution reports whether the write succeeded"]
pub struct Execution {
    rx: oneshot::Receiver<Result<()>>,
}

impl Execution {
    /// Block the current thread until the execution completes.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait(self) -> Result<()> {
        self.rx.blocking_recv().unwrap_or(Err(Error::Cancelled))
    }

    /// Take the result if the execution has completed.
    ///
    /// Returns `None` while the execution is still running. The result can
    /// be taken only once.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(Error::Cancelled)),
        }
    }
}

impl Future for Execution {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Cancelled)))
    }
}

/// Schedule `action` on the background scheduler.
pub(super) fn spawn<A, E>(inner: Arc<Inner>, action: A) -> Execution
where
    A: FnOnce() -> std::result::Result<WriteOutcome, E> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    let (tx, rx) = oneshot::channel();
    let background = inner.background.clone();

    background.schedule(Box::new(move || {
        let result = inner.run_write(action);
        inner.foreground.schedule(Box::new(move || {
            // The caller may have dropped the Execution; that is fine.
            let _ = tx.send(result);
        }));
    }));

    Execution { rx }
}

impl Inner {
    fn run_write<A, E>(&self, action: A) -> Result<()>
    where
        A: FnOnce() -> std::result::Result<WriteOutcome, E>,
        E: Into<BoxError>,
    {
        let outcome = self.locked(|| self.apply_write(action));

        match outcome {
            Ok(WriteOutcome::Changed(set)) => {
                self.metrics.record_write(false);
                let description = set.description();
                let listeners = self.publish(&description);
                tracing::debug!(description = %description, listeners, "write published");
                Ok(())
            }
            Ok(outcome) => {
                self.metrics.record_write(false);
                self.metrics.record_suppressed_publish();
                tracing::debug!(outcome = ?outcome, "write completed without publishing");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_write(true);
                tracing::error!(error = %e, "write failed");
                Err(e)
            }
        }
    }

    /// Run the write body, through the write executor when one is set.
    fn apply_write<A, E>(&self, action: A) -> Result<WriteOutcome>
    where
        A: FnOnce() -> std::result::Result<WriteOutcome, E>,
        E: Into<BoxError>,
    {
        let Some(executor) = &self.write_executor else {
            return action().map_err(Error::write);
        };

        let mut action = Some(action);
        let mut result = None;
        let mut body = || match action.take() {
            Some(action) => {
                let outcome = action();
                let succeeded = outcome.is_ok();
                result = Some(outcome);
                succeeded
            }
            None => false,
        };
        executor(&mut body);

        match result {
            Some(result) => result.map_err(Error::write),
            None => Err(Error::WriteSkipped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::coordinator::QueryCoordinator;
    use crate::scheduler::ManualScheduler;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manual() -> (Arc<ManualScheduler>, Arc<ManualScheduler>) {
        (Arc::new(ManualScheduler::new()), Arc::new(ManualScheduler::new()))
    }

    #[test]
    fn test_execution_runs_on_background_and_completes_on_foreground() {
        let (background, foreground) = manual();
        let coordinator =
            QueryCoordinator::new(background.clone(), foreground.clone(), CoordinatorConfig::new());
        let writes = Arc::new(AtomicUsize::new(0));

        let counter = writes.clone();
        let mut execution = coordinator.execution(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(WriteOutcome::NoChange)
        });

        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert!(execution.try_result().is_none());

        background.run_pending();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert!(execution.try_result().is_none());

        foreground.run_pending();
        assert!(matches!(execution.try_result(), Some(Ok(()))));
    }

    #[test]
    fn test_failed_write_publishes_nothing() {
        let (background, foreground) = manual();
        let coordinator =
            QueryCoordinator::new(background.clone(), foreground.clone(), CoordinatorConfig::new());

        let mut execution = coordinator.execution(|| {
            Err::<WriteOutcome, _>(std::io::Error::other("disk full"))
        });
        background.run_pending();
        foreground.run_pending();

        assert!(matches!(execution.try_result(), Some(Err(Error::Write(_)))));
        let metrics = coordinator.metrics();
        assert_eq!(metrics.publishes, 0);
        assert_eq!(metrics.failed_writes, 1);
    }

    #[test]
    fn test_write_executor_wraps_body() {
        let (background, foreground) = manual();
        let wrapped = Arc::new(AtomicUsize::new(0));

        let counter = wrapped.clone();
        let coordinator = QueryCoordinator::builder(background.clone(), foreground.clone())
            .write_executor(move |body| {
                counter.fetch_add(1, Ordering::SeqCst);
                body();
            })
            .build();

        let mut execution =
            coordinator.execution(|| Ok::<_, Infallible>(ChangeSet::from_table("users").into()));
        background.run_pending();
        foreground.run_pending();

        assert!(matches!(execution.try_result(), Some(Ok(()))));
        assert_eq!(wrapped.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.metrics().publishes, 1);
    }

    #[test]
    fn test_write_executor_sees_failed_body() {
        let (background, foreground) = manual();
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));

        let committed = commits.clone();
        let rolled_back = rollbacks.clone();
        let coordinator = QueryCoordinator::builder(background.clone(), foreground.clone())
            .write_executor(move |body| {
                if body() {
                    committed.fetch_add(1, Ordering::SeqCst);
                } else {
                    rolled_back.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();

        let mut failed =
            coordinator.execution(|| Err::<WriteOutcome, _>("constraint violated"));
        let mut succeeded =
            coordinator.execution(|| Ok::<_, Infallible>(ChangeSet::from_table("users").into()));
        background.run_pending();
        foreground.run_pending();

        let err = failed.try_result().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "write failed: constraint violated");
        assert!(matches!(succeeded.try_result(), Some(Ok(()))));
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.metrics().publishes, 1);
    }

    #[test]
    fn test_write_executor_that_skips_body() {
        let (background, foreground) = manual();
        let coordinator = QueryCoordinator::builder(background.clone(), foreground.clone())
            .write_executor(|_body| {})
            .build();

        let mut execution =
            coordinator.execution(|| Ok::<_, Infallible>(ChangeSet::from_table("users").into()));
        background.run_pending();
        foreground.run_pending();

        assert!(matches!(execution.try_result(), Some(Err(Error::WriteSkipped))));
        assert_eq!(coordinator.metrics().publishes, 0);
    }

    #[test]
    fn test_unreported_write_is_not_published() {
        let (background, foreground) = manual();
        let coordinator =
            QueryCoordinator::new(background.clone(), foreground.clone(), CoordinatorConfig::new());

        let mut execution = coordinator.execution(|| Ok::<_, Infallible>(().into()));
        background.advance_by(Duration::from_millis(1));
        foreground.advance_by(Duration::from_millis(1));

        assert!(matches!(execution.try_result(), Some(Ok(()))));
        let metrics = coordinator.metrics();
        assert_eq!(metrics.publishes, 0);
        assert_eq!(metrics.suppressed_publishes, 1);
    }
}
