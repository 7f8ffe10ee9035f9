//! Queue introspection: point-in-time status and lifetime counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of the queue's scheduling state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queue name
    pub name: String,
    /// Configured concurrency limit
    pub concurrency_limit: usize,
    /// Items currently running
    pub running: usize,
    /// Items waiting in the backlog
    pub pending: usize,
    /// Whether admissions are paused
    pub paused: bool,
}

impl QueueStatus {
    /// Free running slots (ignores the pause flag)
    pub fn available_slots(&self) -> usize {
        self.concurrency_limit.saturating_sub(self.running)
    }

    /// Nothing running and nothing waiting
    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.pending == 0
    }
}

/// Lifetime counters for a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items enqueued
    pub submitted: u64,
    /// Items moved from the backlog to running
    pub started: u64,
    /// Items that returned `Ok`
    pub succeeded: u64,
    /// Items that returned `Err`
    pub failed: u64,
    /// Items that panicked
    pub panicked: u64,
}

impl QueueStats {
    /// Items that have finished, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.panicked
    }
}

/// How a work item finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeeded,
    Failed,
    Panicked,
}

/// Atomic backing store for [`QueueStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    submitted: AtomicU64,
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn task_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Succeeded => &self.succeeded,
            Outcome::Failed => &self.failed,
            Outcome::Panicked => &self.panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        for _ in 0..3 {
            counters.task_submitted();
            counters.task_started();
        }
        counters.task_finished(Outcome::Succeeded);
        counters.task_finished(Outcome::Failed);
        counters.task_finished(Outcome::Panicked);

        let stats = counters.snapshot();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.started, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed(), 3);
    }

    #[test]
    fn test_status_slots() {
        let status = QueueStatus {
            name: "q".into(),
            concurrency_limit: 4,
            running: 3,
            pending: 0,
            paused: true,
        };
        assert_eq!(status.available_slots(), 1);
        assert!(!status.is_idle());
    }

    #[test]
    fn test_status_serializes() {
        let status = QueueStatus {
            name: "q".into(),
            concurrency_limit: 2,
            running: 0,
            pending: 0,
            paused: false,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["concurrency_limit"], 2);
        assert_eq!(json["paused"], false);
        assert!(status.is_idle());
    }
}
