//! Error types for the task queue
//!
//! Two families of errors exist and they never mix:
//! - [`QueueError`] is about the queue itself (bad configuration, no runtime,
//!   drain deadline).
//! - [`TaskError`] is about one work item and is only ever observed through
//!   that item's [`TaskHandle`](crate::TaskHandle).

use std::time::Duration;

/// Queue-level errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Configuration rejected at construction time
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// Queue constructed outside of a tokio runtime
    #[error("no tokio runtime available; construct the queue inside a runtime or pass a handle")]
    NoRuntime,

    /// Drain deadline passed with work still outstanding
    #[error("drain timed out after {timeout:?} ({pending} pending, {running} running)")]
    DrainTimeout {
        timeout: Duration,
        pending: usize,
        running: usize,
    },
}

/// Outcome error delivered through a task handle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError<E> {
    /// The work item returned an error
    #[error("task failed: {0}")]
    Failed(E),

    /// The work item panicked; the panic was contained by the queue
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The runner went away before settling the handle (runtime shutdown)
    #[error("task abandoned before completion")]
    Abandoned,
}

impl<E> TaskError<E> {
    /// Returns the work item's own error, if that is what happened
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the work item panicked
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

/// Extracts a printable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err: TaskError<String> = TaskError::Failed("boom".to_string());
        assert_eq!(err.to_string(), "task failed: boom");

        let err: TaskError<String> = TaskError::Panicked("oops".to_string());
        assert_eq!(err.to_string(), "task panicked: oops");
        assert!(err.is_panic());
    }

    #[test]
    fn test_into_failure() {
        let err: TaskError<u32> = TaskError::Failed(7);
        assert_eq!(err.into_failure(), Some(7));

        let err: TaskError<u32> = TaskError::Abandoned;
        assert_eq!(err.into_failure(), None);
    }

    #[test]
    fn test_drain_timeout_display() {
        let err = QueueError::DrainTimeout {
            timeout: Duration::from_millis(250),
            pending: 3,
            running: 1,
        };
        assert_eq!(
            err.to_string(),
            "drain timed out after 250ms (3 pending, 1 running)"
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
