//! Live query demo.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livequery_demo::{scenario, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livequery_demo=info,livequery_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        debounce_ms = config.coordinator.debounce.as_millis() as u64,
        writers = config.writers,
        writes_per_writer = config.writes_per_writer,
        "configuration loaded"
    );

    let report = match scenario::run(&config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "scenario failed");
            return Err(e.into());
        }
    };

    tracing::info!(
        deliveries = report.updates.len(),
        last = ?report.last_update(),
        final_count = report.final_count,
        commits = report.commits,
        "scenario complete"
    );
    tracing::info!(
        queries = report.metrics.queries,
        requeries = report.metrics.requeries,
        writes = report.metrics.writes,
        failed_writes = report.metrics.failed_writes,
        publishes = report.metrics.publishes,
        suppressed_publishes = report.metrics.suppressed_publishes,
        dropped_deliveries = report.metrics.dropped_deliveries,
        "coordinator metrics"
    );

    Ok(())
}
