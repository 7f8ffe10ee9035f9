//! Bounded-concurrency task queue
//!
//! Admission control lives in `Shared::dispatch`: a level-triggered loop
//! that is re-run after every event that can change admissibility (enqueue,
//! resume, completion). Backlog and counters are only touched under one
//! mutex, so concurrent dispatch passes never pop the same item or
//! double-count a slot.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, instrument, warn};

use crate::config::QueueConfig;
use crate::error::{panic_message, QueueError, TaskError};
use crate::handle::{TaskHandle, TaskId};
use crate::status::{Outcome, QueueStats, QueueStatus, StatsCounters};

/// Result of running a job: its classification plus the deferred handle settlement
struct Finished {
    outcome: Outcome,
    /// Delivers the outcome to the handle; false if the handle was dropped
    settle: Box<dyn FnOnce() -> bool + Send>,
}

/// Type-erased work item
type Job = Box<dyn FnOnce() -> BoxFuture<'static, Finished> + Send>;

struct QueuedTask {
    id: TaskId,
    job: Job,
}

struct State {
    backlog: VecDeque<QueuedTask>,
    running: usize,
    paused: bool,
    /// A dispatch pass is active
    dispatching: bool,
}

struct Shared {
    config: QueueConfig,
    runtime: Handle,
    state: Mutex<State>,
    stats: StatsCounters,
    idle: Notify,
}

/// Bounded-concurrency FIFO task queue
///
/// Runs at most `concurrency_limit` work items at a time, starts waiting
/// items strictly in the order they were enqueued, and can be paused and
/// resumed at any time. Pausing only withholds new admissions; running items
/// are never interrupted.
///
/// Cloning is cheap and every clone drives the same queue.
///
/// # Example
///
/// ```
/// use cadence_queue::TaskQueue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = TaskQueue::new(2)?;
///
/// let handle = queue.enqueue(|| async { Ok::<_, std::io::Error>(21 * 2) });
/// assert_eq!(handle.await?, 42);
///
/// queue.pause();
/// let later = queue.enqueue_future(async { "after resume" });
/// queue.resume();
/// assert_eq!(later.await?, "after resume");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create a queue with the given concurrency limit on the current runtime
    ///
    /// Fails with [`QueueError::InvalidConfig`] for a limit of zero and with
    /// [`QueueError::NoRuntime`] outside a tokio runtime.
    pub fn new(concurrency_limit: usize) -> Result<Self, QueueError> {
        Self::with_config(QueueConfig::new(concurrency_limit))
    }

    /// Create a queue from a configuration on the current runtime
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Create a queue that spawns its work on an explicit runtime
    ///
    /// Such a queue can be driven from threads that are not part of any
    /// runtime.
    pub fn with_runtime(config: QueueConfig, runtime: Handle) -> Result<Self, QueueError> {
        config.validate()?;

        info!(
            queue = %config.name,
            concurrency_limit = config.concurrency_limit,
            start_paused = config.start_paused,
            "Creating task queue"
        );

        let state = State {
            backlog: VecDeque::new(),
            running: 0,
            paused: config.start_paused,
            dispatching: false,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                state: Mutex::new(state),
                stats: StatsCounters::default(),
                idle: Notify::new(),
            }),
        })
    }

    /// Enqueue a work item
    ///
    /// `work` is invoked once, when the item is admitted. Returns immediately
    /// with a handle that settles with the item's value or failure. Errors
    /// and panics inside the work never escape into the queue; they are
    /// delivered only through this handle.
    pub fn enqueue<F, Fut, T, E>(&self, work: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = TaskId::new();
        let submitted_at = Utc::now();
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            async move {
                let caught = AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await;

                let (outcome, result) = match caught {
                    Ok(Ok(value)) => (Outcome::Succeeded, Ok(value)),
                    Ok(Err(e)) => (Outcome::Failed, Err(TaskError::Failed(e))),
                    Err(payload) => (
                        Outcome::Panicked,
                        Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                    ),
                };

                Finished {
                    outcome,
                    settle: Box::new(move || tx.send(result).is_ok()),
                }
            }
            .boxed()
        });

        self.shared.stats.task_submitted();
        {
            let mut state = self.shared.state.lock();
            state.backlog.push_back(QueuedTask { id, job });
            debug!(
                queue = %self.shared.config.name,
                task_id = %id,
                pending = state.backlog.len(),
                running = state.running,
                "Task enqueued"
            );
        }

        Shared::dispatch(&self.shared);

        TaskHandle::new(id, submitted_at, rx)
    }

    /// Enqueue a future that cannot fail
    ///
    /// The future is not polled until the item is admitted.
    pub fn enqueue_future<Fut, T>(&self, fut: Fut) -> TaskHandle<T, Infallible>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(move || fut.map(Ok::<T, Infallible>))
    }

    /// Stop admitting new work items
    ///
    /// Running items continue to completion. Idempotent. An item already
    /// popped by a dispatch pass that won the lock before this call still
    /// starts.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if !state.paused {
            state.paused = true;
            info!(
                queue = %self.shared.config.name,
                running = state.running,
                pending = state.backlog.len(),
                "Queue paused"
            );
        }
    }

    /// Resume admissions and immediately start as many items as capacity allows
    ///
    /// Idempotent.
    pub fn resume(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.paused {
                state.paused = false;
                info!(
                    queue = %self.shared.config.name,
                    running = state.running,
                    pending = state.backlog.len(),
                    "Queue resumed"
                );
            }
        }

        Shared::dispatch(&self.shared);
    }

    /// Whether admissions are paused
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Number of running items
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Number of items waiting in the backlog
    pub fn pending(&self) -> usize {
        self.shared.state.lock().backlog.len()
    }

    /// Nothing running and nothing waiting
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.running == 0 && state.backlog.is_empty()
    }

    /// Configured concurrency limit
    pub fn concurrency_limit(&self) -> usize {
        self.shared.config.concurrency_limit
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Point-in-time scheduling snapshot
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        QueueStatus {
            name: self.shared.config.name.clone(),
            concurrency_limit: self.shared.config.concurrency_limit,
            running: state.running,
            pending: state.backlog.len(),
            paused: state.paused,
        }
    }

    /// Lifetime counters
    pub fn stats(&self) -> QueueStats {
        self.shared.stats.snapshot()
    }

    /// Wait until nothing is running and the backlog is empty
    ///
    /// A paused queue with a non-empty backlog is not idle, so this only
    /// returns after a `resume`.
    #[instrument(skip(self), fields(queue = %self.shared.config.name))]
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                debug!("Queue idle");
                return;
            }

            notified.await;
        }
    }

    /// Wait for the queue to become idle, giving up after `timeout`
    #[instrument(skip(self), fields(queue = %self.shared.config.name))]
    pub async fn drain(&self, timeout: Duration) -> Result<(), QueueError> {
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_ok() {
            return Ok(());
        }

        let status = self.status();
        warn!(
            pending = status.pending,
            running = status.running,
            paused = status.paused,
            "Drain timeout reached"
        );
        Err(QueueError::DrainTimeout {
            timeout,
            pending: status.pending,
            running: status.running,
        })
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    /// Start every item that is currently admissible
    ///
    /// Safe to call at any time from any thread; with no capacity, no backlog
    /// or while paused it does nothing. Only one pass runs at a time: a call
    /// made while another pass is active returns at once, and the active pass
    /// picks up the change when it re-checks under the lock.
    fn dispatch(this: &Arc<Self>) {
        {
            let mut state = this.state.lock();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        loop {
            let (task, slot) = {
                let mut state = this.state.lock();
                if state.paused || state.running >= this.config.concurrency_limit {
                    state.dispatching = false;
                    return;
                }
                let Some(task) = state.backlog.pop_front() else {
                    state.dispatching = false;
                    return;
                };
                state.running += 1;

                debug!(
                    queue = %this.config.name,
                    task_id = %task.id,
                    running = state.running,
                    pending = state.backlog.len(),
                    "Task started"
                );
                (task, RunningSlot::claimed(Arc::clone(this)))
            };

            this.stats.task_started();

            // Detached; the TaskHandle carries the outcome, not the JoinHandle.
            // A runtime that is shutting down drops the runner on the spot,
            // which frees the slot again and lets this loop move on.
            this.runtime.spawn(Self::run(slot, task));
        }
    }

    async fn run(mut slot: RunningSlot, task: QueuedTask) {
        let QueuedTask { id, job } = task;
        let finished = job().await;

        // Slot is freed before the handle settles, so a submitter reacting to
        // the outcome already sees the capacity.
        let (running, pending) = slot.release();
        let shared = Arc::clone(&slot.shared);

        shared.stats.task_finished(finished.outcome);
        match finished.outcome {
            Outcome::Succeeded => {
                debug!(queue = %shared.config.name, task_id = %id, running, pending, "Task succeeded")
            }
            Outcome::Failed => {
                debug!(queue = %shared.config.name, task_id = %id, running, pending, "Task failed")
            }
            Outcome::Panicked => {
                warn!(queue = %shared.config.name, task_id = %id, running, pending, "Task panicked")
            }
        }

        // A discarded outcome is dropped inside settle, and its Drop may panic.
        match std::panic::catch_unwind(AssertUnwindSafe(finished.settle)) {
            Ok(true) => {}
            Ok(false) => debug!(
                queue = %shared.config.name,
                task_id = %id,
                "Handle dropped before completion, outcome discarded"
            ),
            Err(payload) => warn!(
                queue = %shared.config.name,
                task_id = %id,
                panic = %panic_message(payload.as_ref()),
                "Discarded outcome panicked on drop"
            ),
        }

        // Dropping the slot re-runs dispatch and wakes idle waiters.
        drop(slot);
    }
}

/// One claimed unit of concurrency
///
/// Taken under the state lock in `Shared::dispatch` and moved into the
/// runner. Dropping it frees the slot if still held, re-runs dispatch and
/// wakes idle waiters, however the runner ends. That includes the runtime
/// dropping the task during shutdown.
struct RunningSlot {
    shared: Arc<Shared>,
    held: bool,
}

impl RunningSlot {
    fn claimed(shared: Arc<Shared>) -> Self {
        Self { shared, held: true }
    }

    /// Give the slot back without dispatching; returns `(running, pending)`
    fn release(&mut self) -> (usize, usize) {
        let mut state = self.shared.state.lock();
        if self.held {
            self.held = false;
            state.running = state.running.saturating_sub(1);
        }
        (state.running, state.backlog.len())
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.release();
        Shared::dispatch(&self.shared);
        self.shared.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_outside_runtime_fails() {
        assert_eq!(TaskQueue::new(1).unwrap_err(), QueueError::NoRuntime);
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        assert!(matches!(
            TaskQueue::new(0),
            Err(QueueError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_returns_value() {
        let queue = TaskQueue::new(2).unwrap();
        let handle = queue.enqueue(|| async { Ok::<_, String>("done") });
        assert_eq!(handle.await, Ok("done"));
    }

    #[tokio::test]
    async fn test_enqueue_delivers_failure() {
        let queue = TaskQueue::new(2).unwrap();
        let handle = queue.enqueue(|| async { Err::<(), _>("bad input".to_string()) });
        assert_eq!(handle.await, Err(TaskError::Failed("bad input".to_string())));
    }

    #[tokio::test]
    async fn test_panicking_task_frees_slot() {
        let queue = TaskQueue::new(1).unwrap();

        let bad = queue.enqueue(|| async {
            if true {
                panic!("kaboom");
            }
            Ok::<u8, String>(0)
        });
        let good = queue.enqueue(|| async { Ok::<_, String>(1u8) });

        assert_eq!(bad.await, Err(TaskError::Panicked("kaboom".to_string())));
        assert_eq!(good.await, Ok(1));
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.stats().panicked, 1);
    }

    #[tokio::test]
    async fn test_panic_in_closure_is_contained() {
        let queue = TaskQueue::new(1).unwrap();
        let handle = queue.enqueue(|| -> futures::future::Ready<Result<(), String>> {
            panic!("before the future exists")
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_start_paused_withholds_work() {
        let queue = TaskQueue::with_config(QueueConfig::new(2).with_start_paused(true)).unwrap();
        let started = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&started);
        let handle = queue.enqueue(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        });

        tokio::task::yield_now().await;
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 1);
        assert!(queue.is_paused());

        queue.resume();
        assert_eq!(queue.running(), 1);
        assert_eq!(queue.pending(), 0);
        handle.await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pause_resume_idempotent() {
        let queue = TaskQueue::new(3).unwrap();

        queue.pause();
        let once = queue.status();
        queue.pause();
        assert_eq!(queue.status(), once);
        assert!(queue.is_paused());

        queue.resume();
        let once = queue.status();
        queue.resume();
        assert_eq!(queue.status(), once);
        assert!(!queue.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_idempotent_with_backlog() {
        let queue = TaskQueue::new(2).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| queue.enqueue_future(tokio::time::sleep(Duration::from_secs(5))))
            .collect();
        assert_eq!((queue.running(), queue.pending()), (2, 2));

        queue.pause();
        let once = queue.status();
        queue.pause();
        assert_eq!(queue.status(), once);
        assert_eq!((once.running, once.pending), (2, 2));

        queue.resume();
        queue.resume();
        assert_eq!((queue.running(), queue.pending()), (2, 2));

        // Free capacity while paused: a double resume still fills only the limit
        queue.pause();
        let mut handles = handles.into_iter();
        for handle in handles.by_ref().take(2) {
            handle.await.unwrap();
        }
        let extra = queue.enqueue_future(async {});
        assert_eq!((queue.running(), queue.pending()), (0, 3));

        queue.resume();
        queue.resume();
        assert_eq!((queue.running(), queue.pending()), (2, 1));

        for handle in handles {
            handle.await.unwrap();
        }
        extra.await.unwrap();
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_enqueue_future() {
        let queue = TaskQueue::new(1).unwrap();
        let handle = queue.enqueue_future(async { 7 * 6 });
        assert_eq!(handle.await, Ok(42));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs() {
        let queue = TaskQueue::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        drop(queue.enqueue(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("nobody is listening")
        }));

        queue.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let queue = TaskQueue::new(1).unwrap();
        let other = queue.clone();

        other.pause();
        assert!(queue.is_paused());

        let handle = other.enqueue_future(async {});
        assert_eq!(queue.pending(), 1);
        queue.resume();
        handle.await.unwrap();
        assert_eq!(queue.stats().succeeded, 1);
    }

    #[test]
    fn test_with_runtime_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let queue = TaskQueue::with_runtime(QueueConfig::new(2), runtime.handle().clone()).unwrap();
        let handle = queue.enqueue(|| async { Ok::<_, String>(3) });

        assert_eq!(runtime.block_on(handle), Ok(3));
    }

    struct PanicsOnDrop;

    impl Drop for PanicsOnDrop {
        fn drop(&mut self) {
            if !std::thread::panicking() {
                panic!("dropped");
            }
        }
    }

    #[tokio::test]
    async fn test_outcome_panicking_on_drop_does_not_stall_queue() {
        let queue = TaskQueue::new(1).unwrap();

        drop(queue.enqueue(|| async { Ok::<_, String>(PanicsOnDrop) }));
        let second = queue.enqueue(|| async { Ok::<_, String>("second") });

        let result = tokio::time::timeout(Duration::from_secs(2), second).await;
        assert_eq!(result.unwrap(), Ok("second"));

        queue.wait_idle().await;
        assert!(queue.is_idle());
        assert_eq!(queue.stats().succeeded, 2);
    }

    #[test]
    fn test_runtime_shutdown_releases_slot() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let queue = TaskQueue::with_runtime(QueueConfig::new(1), runtime.handle().clone()).unwrap();
        let (mut running, mut waiting) = {
            let _guard = runtime.enter();
            let running = queue.enqueue_future(tokio::time::sleep(Duration::from_secs(60)));
            let waiting = queue.enqueue_future(async {});
            (running, waiting)
        };

        runtime.block_on(async { tokio::time::sleep(Duration::from_millis(10)).await });
        assert_eq!((queue.running(), queue.pending()), (1, 1));

        drop(runtime);

        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_idle());
        assert_eq!(running.try_result(), Some(Err(TaskError::Abandoned)));
        assert_eq!(waiting.try_result(), Some(Err(TaskError::Abandoned)));
    }
}
