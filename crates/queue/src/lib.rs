//! # Cadence task queue
//!
//! An in-process, bounded-concurrency FIFO queue for asynchronous work.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most `concurrency_limit` work items run at once
//! - **FIFO admission**: waiting items start strictly in enqueue order
//! - **Pause / resume**: withhold new admissions without touching running work
//! - **Per-item handles**: every enqueue returns a [`TaskHandle`] future that
//!   settles once with the item's value or failure
//! - **Failure isolation**: errors and panics stay inside the failing item's
//!   handle; the queue and other items are unaffected, nothing is retried
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  enqueue   ┌─────────────────────────────────────────┐
//! │  Submitters  │ ─────────► │               TaskQueue                 │
//! └──────────────┘            │  backlog (FIFO) │ running │ paused      │
//!        ▲                    └─────────────────────────────────────────┘
//!        │                                  │ dispatch (on enqueue,
//!        │                                  │ resume, completion)
//!        │                                  ▼
//!        │                    ┌─────────────────────────────────────────┐
//!        └──── TaskHandle ─── │      tokio tasks (≤ concurrency_limit)  │
//!                             └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use cadence_queue::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = TaskQueue::with_config(QueueConfig::new(2).with_name("renders"))?;
//!
//! let first = queue.enqueue(|| async {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//!     Ok::<_, std::io::Error>("first")
//! });
//! queue.pause();
//! let second = queue.enqueue_future(async { "second" });
//!
//! assert_eq!(first.await?, "first");
//! queue.resume();
//! assert_eq!(second.await?, "second");
//! # Ok(())
//! # }
//! ```
//!
//! A failure that nobody awaits is lost: the queue has no global error
//! channel. Keep the handle if the outcome matters.

pub mod config;
pub mod error;
pub mod handle;
pub mod queue;
pub mod status;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{QueueError, TaskError};
    pub use crate::handle::{TaskHandle, TaskId, TaskResult};
    pub use crate::queue::TaskQueue;
    pub use crate::status::{QueueStats, QueueStatus};
}

// Re-export key types at crate root
pub use config::QueueConfig;
pub use error::{QueueError, TaskError};
pub use handle::{TaskHandle, TaskId, TaskResult};
pub use queue::TaskQueue;
pub use status::{QueueStats, QueueStatus};
