//! livequery core - live query results over a shared mutable store.
//!
//! Writes describe what they changed with a [`ChangeSet`]; live queries
//! declare what they depend on with a [`DependencyPattern`]. The
//! [`QueryCoordinator`] serializes all store access behind one lock, publishes
//! change descriptions, and re-runs matching live queries after a debounce
//! window.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use livequery_core::{ChangeSet, CoordinatorConfig, DataPattern, QueryCoordinator, WorkerScheduler};
//!
//! let background = Arc::new(WorkerScheduler::start("store-background")?);
//! let foreground = Arc::new(WorkerScheduler::start("store-foreground")?);
//! let coordinator = QueryCoordinator::new(background, foreground, CoordinatorConfig::new());
//!
//! // Emits once immediately, then again after every burst of "users" changes.
//! let subscription = coordinator.updatable(
//!     ChangeSet::from_table("users").pattern(),
//!     move || store.count_users(),
//!     |count| println!("users: {count:?}"),
//! );
//!
//! coordinator
//!     .execution(move || store.insert_user("ada").map(|id| ChangeSet::from_row("users", id).into()))
//!     .await?;
//! ```

pub mod bus;
pub mod change_set;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod scheduler;

pub use bus::{ChangeBus, Listener, ListenerId};
pub use change_set::{ChangeSet, DataDescription, DataPattern};
pub use config::{CoordinatorConfig, DEFAULT_DEBOUNCE_MS};
pub use coordinator::{
    CoordinatorBuilder, Execution, QueryCoordinator, Subscription, WriteExecutor, WriteOutcome,
};
pub use error::{BoxError, Error, Result};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use pattern::DependencyPattern;
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, WorkerScheduler};
