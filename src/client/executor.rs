//! # Task Executor
//!
//! A fixed-size worker pool that runs discovery calls off the caller's thread.
//!
//! Work is submitted as a zero-argument closure producing a future. Submission
//! never blocks and returns a [`TaskHandle`] immediately; the caller may poll
//! it, attach a completion reaction, await it, or block on it later.
//!
//! ## Ordering
//!
//! With one worker, tasks run to completion one after another in submission
//! order. With more workers, tasks run concurrently and may finish in any
//! order; correlate results through their handles.
//!
//! ## Cancellation
//!
//! Cancelling a handle before its task starts prevents the task from running.
//! Cancelling after it started lets the call run to completion (or to its own
//! deadline) and only withholds the result from that handle.
//!
//! The executor imposes no timeout of its own.

use log::{debug, error, info};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::common::error::{DiscoveryError, Result};

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Lifecycle of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Accepted by the pool, not yet picked up by a worker
    Submitted,
    /// A worker is executing the call
    Running,
    Completed,
    Failed,
    /// Failed with `DeadlineExceeded`
    TimedOut,
    /// Cancelled before a worker picked it up
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Submitted | TaskState::Running)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Submitted,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            4 => TaskState::TimedOut,
            _ => TaskState::Cancelled,
        }
    }
}

/// Set on top of `Running` or a terminal state when a handle was cancelled
/// after its task started.
const WITHHELD: u8 = 0x80;

struct TaskStatus {
    state: AtomicU8,
}

impl TaskStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(TaskState::Submitted as u8),
        }
    }

    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire) & !WITHHELD)
    }

    /// Claim the task for execution. False if it was cancelled first.
    fn begin(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Submitted as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish<T>(&self, result: &Result<T>) {
        let state = match result {
            Ok(_) => TaskState::Completed,
            Err(DiscoveryError::DeadlineExceeded(_)) => TaskState::TimedOut,
            Err(_) => TaskState::Failed,
        };
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current & WITHHELD) | state as u8)
            });
    }

    /// Prevents a queued task from running, or withholds a running task's
    /// result. A finished task is left untouched.
    fn cancel(&self) -> bool {
        let mut prevented = false;
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match TaskState::from_u8(current & !WITHHELD) {
                    TaskState::Submitted => {
                        prevented = true;
                        Some(TaskState::Cancelled as u8)
                    }
                    TaskState::Running => {
                        prevented = false;
                        Some(current | WITHHELD)
                    }
                    _ => {
                        prevented = false;
                        None
                    }
                }
            });
        prevented
    }

    fn is_cancelled(&self) -> bool {
        let current = self.state.load(Ordering::Acquire);
        current & WITHHELD != 0 || TaskState::from_u8(current) == TaskState::Cancelled
    }
}

/// Bounded worker pool shared by discovery clients.
pub struct TaskExecutor {
    runtime: Option<Runtime>,
    handle: Handle,
    queue: mpsc::UnboundedSender<Job>,
    pool_size: usize,
}

impl TaskExecutor {
    /// Start a pool with `pool_size` workers (at least one).
    ///
    /// # Errors
    /// `Executor` if the worker threads cannot be spawned.
    pub fn new(pool_size: usize) -> Result<Self> {
        let pool_size = pool_size.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(pool_size)
            .thread_name("discovery-worker")
            .enable_all()
            .build()
            .map_err(|e| DiscoveryError::Executor(format!("failed to start worker pool: {}", e)))?;

        let (queue, jobs) = mpsc::unbounded_channel::<Job>();
        let jobs = Arc::new(Mutex::new(jobs));

        for worker in 0..pool_size {
            let jobs = jobs.clone();
            runtime.spawn(async move {
                loop {
                    let job = { jobs.lock().await.recv().await };
                    let Some(job) = job else { break };
                    job().await;
                }
                debug!("Worker {} stopped", worker);
            });
        }

        info!("🚀 Worker pool started with {} worker(s)", pool_size);

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            queue,
            pool_size,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Queue `work` and return its handle immediately.
    pub fn submit<F, Fut, T>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let status = Arc::new(TaskStatus::new());
        let (tx, rx) = watch::channel(None);

        let job_status = status.clone();
        let job: Job = Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                if !job_status.begin() {
                    debug!("⏭️  Task {} cancelled before start", id);
                    return;
                }
                // A panicking call fails its task, not the worker.
                let result = match tokio::spawn(async move { work().await }).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("❌ Task {} aborted: {}", id, e);
                        Err(DiscoveryError::Executor(format!("task aborted: {}", e)))
                    }
                };
                job_status.finish(&result);
                let _ = tx.send(Some(result));
            })
        });

        if self.queue.send(job).is_err() {
            error!("❌ Task {} rejected: worker pool has shut down", id);
            status
                .state
                .store(TaskState::Failed as u8, Ordering::Release);
        } else {
            debug!("Task {} submitted", id);
        }

        TaskHandle {
            id,
            status,
            result: rx,
            runtime: self.handle.clone(),
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Handle to one submitted task.
///
/// Once the task reaches a terminal state its result never changes and can be
/// retrieved any number of times.
pub struct TaskHandle<T> {
    id: Uuid,
    status: Arc<TaskStatus>,
    result: watch::Receiver<Option<Result<T>>>,
    runtime: Handle,
}

impl<T> TaskHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// State of the underlying task.
    ///
    /// After a cancel that came too late to stop the task, this keeps
    /// tracking the call itself (`Running`, then `Completed`, `Failed` or
    /// `TimedOut`) while retrievals from this handle return `Cancelled`.
    /// Check [`is_cancelled`](Self::is_cancelled) to tell the two apart.
    pub fn state(&self) -> TaskState {
        self.status.state()
    }

    /// True if this handle was cancelled, whether or not the task ran.
    /// Retrievals then return `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancel the task.
    ///
    /// Returns `true` if the task had not started and will never run. Returns
    /// `false` if it is already running; the call is not interrupted, but
    /// this handle will report `Cancelled` from now on. Cancelling a finished
    /// task returns `false` and keeps its result.
    pub fn cancel(&self) -> bool {
        let prevented = self.status.cancel();
        if prevented {
            info!("🛑 Task {} cancelled before start", self.id);
        } else if self.status.is_cancelled() {
            info!("🛑 Task {} cancelled, result withheld", self.id);
        } else {
            debug!("Task {} already finished, cancel ignored", self.id);
        }
        prevented
    }

    /// Non-blocking poll. `None` while the task is still queued or running.
    pub fn try_result(&self) -> Option<Result<T>> {
        if self.status.is_cancelled() {
            return Some(Err(DiscoveryError::Cancelled));
        }
        if let Some(result) = self.result.borrow().as_ref() {
            return Some(result.clone());
        }
        if self.result.has_changed().is_err() {
            return Some(Err(abandoned()));
        }
        None
    }

    /// Wait for the result without blocking the executor's threads.
    pub async fn wait_async(&self) -> Result<T> {
        let mut rx = self.result.clone();
        resolve(&mut rx, &self.status).await
    }

    /// Block the calling thread until the task reaches a terminal state.
    ///
    /// # Errors
    /// `Executor` when called from inside an async runtime; use
    /// [`wait_async`](Self::wait_async) there instead.
    pub fn wait(&self) -> Result<T> {
        if Handle::try_current().is_ok() {
            return Err(DiscoveryError::Executor(
                "blocking wait called from an async context, use wait_async".to_string(),
            ));
        }
        self.runtime.block_on(self.wait_async())
    }

    /// Run `callback` with the result once the task finishes.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let mut rx = self.result.clone();
        let status = self.status.clone();
        self.runtime.spawn(async move {
            callback(resolve(&mut rx, &status).await);
        });
    }
}

async fn resolve<T: Clone>(
    rx: &mut watch::Receiver<Option<Result<T>>>,
    status: &TaskStatus,
) -> Result<T> {
    if status.is_cancelled() {
        return Err(DiscoveryError::Cancelled);
    }

    let outcome = rx.wait_for(|result| result.is_some()).await.map(|r| (*r).clone());

    if status.is_cancelled() {
        return Err(DiscoveryError::Cancelled);
    }
    match outcome {
        Ok(Some(result)) => result,
        _ => Err(abandoned()),
    }
}

fn abandoned() -> DiscoveryError {
    DiscoveryError::Executor("task ended without producing a result".to_string())
}
