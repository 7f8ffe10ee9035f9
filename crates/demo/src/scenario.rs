//! Pause / resume walkthrough
//!
//! Queue with limit 2. Task 1 (long) is enqueued, the queue is paused, then
//! tasks 2 and 3 (short) are enqueued. Only task 1 runs; when it settles the
//! queue is resumed and tasks 2 and 3 start together.

use std::time::Duration;

use anyhow::{Context, Result};
use cadence_queue::{QueueConfig, QueueStats, TaskError, TaskQueue};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info};

/// Demo timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Duration of the first (long) task
    pub long_task: Duration,
    /// Duration of the two short tasks
    pub short_task: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            long_task: Duration::from_millis(2000),
            short_task: Duration::from_millis(1000),
        }
    }
}

impl DemoConfig {
    /// Create configuration from environment variables
    ///
    /// - `CADENCE_DEMO_LONG_MS`: long task duration (default: 2000)
    /// - `CADENCE_DEMO_SHORT_MS`: short task duration (default: 1000)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("CADENCE_DEMO_LONG_MS") {
            config.long_task = Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("CADENCE_DEMO_LONG_MS is not a number: {raw:?}"))?,
            );
        }
        if let Ok(raw) = std::env::var("CADENCE_DEMO_SHORT_MS") {
            config.short_task = Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("CADENCE_DEMO_SHORT_MS is not a number: {raw:?}"))?,
            );
        }
        Ok(config)
    }
}

/// One settled task as observed by its submitter
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub task: String,
    pub result: Result<String, String>,
    pub elapsed_ms: u128,
}

/// Everything the walkthrough observed
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub completions: Vec<Completion>,
    pub stats: QueueStats,
}

impl ScenarioReport {
    /// Task names in the order their handles settled
    pub fn completion_order(&self) -> Vec<&str> {
        self.completions.iter().map(|c| c.task.as_str()).collect()
    }
}

fn timed_task(
    name: &'static str,
    duration: Duration,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<String, String>> + Send + 'static
{
    move || {
        Box::pin(async move {
            tokio::time::sleep(duration).await;
            info!(task = name, "{name} completed");
            Ok(format!("Result {}", name.trim_start_matches("Task ")))
        })
    }
}

fn record(
    name: &str,
    started: Instant,
    outcome: Result<String, TaskError<String>>,
) -> Completion {
    let result = match outcome {
        Ok(value) => {
            info!(task = name, result = %value, "{name} result");
            Ok(value)
        }
        Err(e) => {
            error!(task = name, error = %e, "{name} error");
            Err(e.to_string())
        }
    };
    Completion {
        task: name.to_string(),
        result,
        elapsed_ms: started.elapsed().as_millis(),
    }
}

/// Run the walkthrough to completion
pub async fn run(queue_config: QueueConfig, config: &DemoConfig) -> Result<ScenarioReport> {
    let queue = TaskQueue::with_config(queue_config).context("Failed to create task queue")?;
    let started = Instant::now();

    let first = queue.enqueue(timed_task("Task 1", config.long_task));

    queue.pause();
    info!("Is Paused");

    let second = queue.enqueue(timed_task("Task 2", config.short_task));
    let third = queue.enqueue(timed_task("Task 3", config.short_task));

    let mut completions = Vec::with_capacity(3);

    // Resume as soon as the first task settles, whatever its outcome.
    completions.push(record("Task 1", started, first.await));
    queue.resume();
    info!("Is Resumed.");

    let (second, third) = tokio::join!(
        async { record("Task 2", started, second.await) },
        async { record("Task 3", started, third.await) },
    );
    let mut rest = [second, third];
    rest.sort_by_key(|c| c.elapsed_ms);
    completions.extend(rest);

    queue.wait_idle().await;

    Ok(ScenarioReport {
        completions,
        stats: queue.stats(),
    })
}
