//! Completion handles returned by `enqueue`

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::TaskError;

/// Identifier assigned to every enqueued work item
///
/// UUID v7, so ids sort by submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome carried by a handle
pub type TaskResult<T, E> = Result<T, TaskError<E>>;

/// Handle to an enqueued work item
///
/// Resolves exactly once with the item's value or its failure. The handle is
/// a plain future: await it, `select!` on it, or drop it.
///
/// Dropping the handle does NOT cancel the work. The item still runs and its
/// outcome is discarded, so a failure nobody awaits is silently lost; callers
/// that care about failures must keep and inspect the handle.
#[must_use = "dropping a TaskHandle discards the task's outcome, including failures"]
pub struct TaskHandle<T, E> {
    id: TaskId,
    submitted_at: DateTime<Utc>,
    rx: oneshot::Receiver<TaskResult<T, E>>,
    taken: bool,
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) fn new(
        id: TaskId,
        submitted_at: DateTime<Utc>,
        rx: oneshot::Receiver<TaskResult<T, E>>,
    ) -> Self {
        Self {
            id,
            submitted_at,
            rx,
            taken: false,
        }
    }

    /// Id of the work item
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// When the item was enqueued
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Non-blocking check for the outcome
    ///
    /// Returns `None` while the item is pending or running. Once this returns
    /// `Some`, the outcome has been taken and later polls yield `Abandoned`.
    pub fn try_result(&mut self) -> Option<TaskResult<T, E>> {
        if self.taken {
            return Some(Err(TaskError::Abandoned));
        }
        let result = match self.rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(TaskError::Abandoned),
        };
        self.taken = true;
        Some(result)
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = TaskResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.taken {
            return Poll::Ready(Err(TaskError::Abandoned));
        }
        let result = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(TaskError::Abandoned),
            Poll::Pending => return Poll::Pending,
        };
        self.taken = true;
        Poll::Ready(result)
    }
}

impl<T, E> fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle<T, E>() -> (oneshot::Sender<TaskResult<T, E>>, TaskHandle<T, E>) {
        let (tx, rx) = oneshot::channel();
        (tx, TaskHandle::new(TaskId::new(), Utc::now(), rx))
    }

    #[tokio::test]
    async fn test_handle_resolves_with_value() {
        let (tx, handle) = handle::<u32, String>();
        tx.send(Ok(5)).unwrap();
        assert_eq!(handle.await, Ok(5));
    }

    #[tokio::test]
    async fn test_handle_abandoned_when_sender_dropped() {
        let (tx, handle) = handle::<u32, String>();
        drop(tx);
        assert_eq!(handle.await, Err(TaskError::Abandoned));
    }

    #[test]
    fn test_try_result() {
        let (tx, mut handle) = handle::<u32, String>();
        assert!(handle.try_result().is_none());

        tx.send(Err(TaskError::Failed("nope".into()))).unwrap();
        assert_eq!(
            handle.try_result(),
            Some(Err(TaskError::Failed("nope".into())))
        );
        assert_eq!(handle.try_result(), Some(Err(TaskError::Abandoned)));
    }

    #[test]
    fn test_task_ids_are_unique() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert_ne!(first, second);
        assert_eq!(first.to_string(), first.as_uuid().to_string());
    }
}
