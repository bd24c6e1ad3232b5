//! Demo configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use livequery_core::{CoordinatorConfig, DEFAULT_DEBOUNCE_MS};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default number of concurrent writers.
pub const DEFAULT_WRITERS: usize = 4;

/// Default number of writes per writer.
pub const DEFAULT_WRITES_PER_WRITER: usize = 25;

/// Default time to wait for the last live update, in milliseconds.
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// Demo configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,

    /// Number of concurrent writer tasks.
    pub writers: usize,

    /// Inserts issued by each writer.
    pub writes_per_writer: usize,

    /// How long to wait for trailing live updates after the last write.
    #[serde(rename = "settle_ms", with = "livequery_core::config::millis")]
    pub settle: Duration,
}

impl DemoConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            writers: DEFAULT_WRITERS,
            writes_per_writer: DEFAULT_WRITES_PER_WRITER,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Set the coordinator configuration.
    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Set the number of writers.
    pub fn with_writers(mut self, writers: usize) -> Self {
        self.writers = writers.max(1);
        self
    }

    /// Set the number of writes per writer.
    pub fn with_writes_per_writer(mut self, writes: usize) -> Self {
        self.writes_per_writer = writes;
        self
    }

    /// Set the settle period.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Total number of inserts the scenario issues.
    pub fn total_writes(&self) -> usize {
        self.writers * self.writes_per_writer
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the demo.
#[derive(Parser, Debug)]
#[command(name = "livequery-demo")]
#[command(version, about = "Live query coordinator demo", long_about = None)]
pub struct Args {
    /// JSON configuration file. Command-line flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debounce window in milliseconds.
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Number of concurrent writers.
    #[arg(long)]
    pub writers: Option<usize>,

    /// Inserts issued by each writer.
    #[arg(long)]
    pub writes: Option<usize>,

    /// Milliseconds to wait for trailing live updates.
    #[arg(long)]
    pub settle_ms: Option<u64>,
}

impl Args {
    /// Convert command-line arguments to demo configuration.
    pub fn into_config(self) -> Result<DemoConfig, Error> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::from_file(path)?,
            None => DemoConfig::default(),
        };

        if let Some(debounce_ms) = self.debounce_ms {
            config.coordinator = config.coordinator.with_debounce_ms(debounce_ms);
        }
        if let Some(writers) = self.writers {
            config = config.with_writers(writers);
        }
        if let Some(writes) = self.writes {
            config = config.with_writes_per_writer(writes);
        }
        if let Some(settle_ms) = self.settle_ms {
            config = config.with_settle(Duration::from_millis(settle_ms));
        }

        if config.writers == 0 {
            return Err(Error::Config("writers must be at least 1".to_string()));
        }
        Ok(config)
    }
}
