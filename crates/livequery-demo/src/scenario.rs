//! Concurrent writers against a live row count.

use std::sync::Arc;

use livequery_core::{
    ChangeSet, CoordinatorConfig, DependencyPattern, MetricsSnapshot, QueryCoordinator,
    Result as CoreResult, Scheduler, WorkerScheduler, WriteOutcome,
};
use tokio::sync::mpsc;

use crate::config::DemoConfig;
use crate::error::{Error, StoreError};
use crate::store::{MemoryStore, SharedStore, Updated};

/// Table the writers insert into.
pub const TODOS: &str = "todos";

/// Table touched by the bookkeeping writes.
pub const USERS: &str = "users";

/// Outcome of a scenario run.
#[derive(Debug, Clone)]
pub struct Report {
    /// Row counts delivered to the live query, in delivery order.
    pub updates: Vec<usize>,
    /// Row count read after the run settled.
    pub final_count: usize,
    /// Writes committed through the write executor.
    pub commits: u64,
    /// Writes rolled back because the write failed.
    pub rollbacks: u64,
    /// Coordinator counters at the end of the run.
    pub metrics: MetricsSnapshot,
}

impl Report {
    /// Last count the live query delivered.
    pub fn last_update(&self) -> Option<usize> {
        self.updates.last().copied()
    }
}

/// Build a coordinator whose writes run as store transactions.
///
/// A write is committed when its action succeeds and rolled back otherwise.
pub fn transactional_coordinator(
    background: Arc<dyn Scheduler>,
    foreground: Arc<dyn Scheduler>,
    config: CoordinatorConfig,
    store: SharedStore,
) -> QueryCoordinator {
    QueryCoordinator::builder(background, foreground)
        .config(config)
        .write_executor(move |body| {
            let span = tracing::debug_span!("write");
            let _enter = span.enter();
            store.lock().begin();
            if body() {
                store.lock().commit();
            } else {
                store.lock().rollback();
                tracing::debug!("write rolled back");
            }
        })
        .build()
}

/// Run the scenario.
///
/// Writers insert rows concurrently while one live query tracks the row
/// count. A no-op update and an out-of-band delete follow the inserts.
pub async fn run(config: &DemoConfig) -> Result<Report, Error> {
    let background = Arc::new(WorkerScheduler::start("livequery-background")?);
    let foreground = Arc::new(WorkerScheduler::start("livequery-foreground")?);
    let store = MemoryStore::shared();

    let coordinator = transactional_coordinator(
        background.clone(),
        foreground.clone(),
        config.coordinator.clone(),
        store.clone(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let count_store = store.clone();
    let subscription = coordinator.updatable(
        DependencyPattern::from_tables([TODOS]),
        move || Ok::<_, StoreError>(count_store.lock().count(TODOS)),
        move |result: CoreResult<usize>| match result {
            Ok(count) => {
                tracing::debug!(count, "live count");
                let _ = tx.send(count);
            }
            Err(e) => tracing::warn!(error = %e, "live count failed"),
        },
    );

    let user_store = store.clone();
    coordinator
        .execution(move || {
            let id = user_store.lock().insert(USERS, "admin");
            Ok::<WriteOutcome, StoreError>(ChangeSet::from_row(USERS, id).into())
        })
        .await?;

    let mut writers = Vec::with_capacity(config.writers);
    for writer in 0..config.writers {
        let coordinator = coordinator.clone();
        let store = store.clone();
        let writes = config.writes_per_writer;
        writers.push(tokio::spawn(async move {
            for item in 0..writes {
                let store = store.clone();
                coordinator
                    .execution(move || {
                        let id = store
                            .lock()
                            .insert(TODOS, format!("writer {} item {}", writer, item));
                        Ok::<WriteOutcome, StoreError>(ChangeSet::from_row(TODOS, id).into())
                    })
                    .await?;
            }
            Ok::<_, Error>(())
        }));
    }
    for writer in writers {
        writer.await??;
    }
    tracing::info!(inserted = config.total_writes(), "writers finished");

    // Same value again: the store reports no change and nothing is published.
    let users = coordinator.query(|| Ok::<_, Error>(store.lock().rows(USERS)))?;
    for (user_id, name) in users {
        let noop_store = store.clone();
        coordinator
            .execution(move || {
                let outcome = match noop_store.lock().update(USERS, user_id, &name)? {
                    Updated::Changed => ChangeSet::from_row(USERS, user_id).into(),
                    Updated::Unchanged => WriteOutcome::NoChange,
                };
                Ok::<_, StoreError>(outcome)
            })
            .await?;
    }

    // Simulates an external writer: it bypasses the coordinator lock and
    // reports the change after the fact.
    let first = store.lock().rows(TODOS).first().map(|(id, _)| *id);
    if let Some(id) = first {
        store.lock().delete(TODOS, id)?;
        let reached = coordinator.notify_data_change(&ChangeSet::from_row(TODOS, id));
        tracing::info!(row = id, reached, "external delete reported");
    }

    tokio::time::sleep(config.coordinator.debounce + config.settle).await;

    let final_count = coordinator.query(|| Ok::<_, Error>(store.lock().count(TODOS)))?;
    subscription.unsubscribe();
    background.stop();
    foreground.stop();

    let mut updates = Vec::new();
    while let Ok(count) = rx.try_recv() {
        updates.push(count);
    }

    let (commits, rollbacks) = {
        let store = store.lock();
        (store.commits(), store.rollbacks())
    };
    Ok(Report {
        updates,
        final_count,
        commits,
        rollbacks,
        metrics: coordinator.metrics(),
    })
}
