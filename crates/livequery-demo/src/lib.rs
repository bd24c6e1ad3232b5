//! Live query demo library.
//!
//! Runs concurrent writers against an in-memory table store while a live
//! query keeps a row count up to date through the coordinator.

pub mod config;
pub mod error;
pub mod scenario;
pub mod store;

pub use config::{Args, DemoConfig};
pub use error::{Error, StoreError};
pub use scenario::{run, Report};
pub use store::{MemoryStore, SharedStore, Updated};
