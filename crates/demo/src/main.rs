use anyhow::{Context, Result};
use cadence_queue::config::ENV_CONCURRENCY_LIMIT;
use cadence_queue::QueueConfig;

mod scenario;
mod telemetry;

use scenario::DemoConfig;
use telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "cadence_queue=debug,cadence_demo=info")
    // - CADENCE_CONCURRENCY_LIMIT, CADENCE_QUEUE_NAME, CADENCE_START_PAUSED: queue settings
    // - CADENCE_DEMO_LONG_MS, CADENCE_DEMO_SHORT_MS: task durations
    init_logging(&LogConfig::from_env());

    let mut queue_config = QueueConfig::from_env().context("Invalid queue configuration")?;
    if std::env::var(ENV_CONCURRENCY_LIMIT).is_err() {
        // The walkthrough is written for two slots
        queue_config = queue_config.with_concurrency_limit(2);
    }
    if queue_config.start_paused {
        // Task 1 must run before anything resumes the queue
        tracing::warn!("Ignoring CADENCE_START_PAUSED for the walkthrough");
        queue_config = queue_config.with_start_paused(false);
    }
    let demo_config = DemoConfig::from_env()?;

    tracing::info!(
        queue = %queue_config.name,
        concurrency_limit = queue_config.concurrency_limit,
        long_task = ?demo_config.long_task,
        short_task = ?demo_config.short_task,
        "Starting pause/resume walkthrough"
    );

    let report = scenario::run(queue_config, &demo_config).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    tracing::info!(order = ?report.completion_order(), "Walkthrough complete");
    Ok(())
}
