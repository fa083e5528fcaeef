//! Worker pool for planning requests.
//!
//! Planning work runs here, off the control loop. The pool bounds how many
//! requests run at once; callers get a one-shot channel they can poll
//! without blocking. Jobs still waiting for a slot when the pool shuts
//! down are dropped, which closes their channel.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Semaphore, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::sync::lock;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Failed to start worker runtime: {0}")]
    Runtime(String),
}

pub struct WorkerPool {
    handle: Handle,
    /// Owned runtime of a dedicated pool; `None` when borrowing a handle
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Pool on its own multi-threaded runtime.
    pub fn dedicated(threads: usize, max_concurrent: usize) -> Result<Self, PoolError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("planner-worker")
            .enable_all()
            .build()
            .map_err(|e| PoolError::Runtime(e.to_string()))?;
        let handle = runtime.handle().clone();
        info!(threads, max_concurrent, "Started planning worker pool");
        Ok(Self::build(handle, Some(runtime), max_concurrent))
    }

    /// Pool that spawns onto an existing runtime.
    pub fn on_handle(handle: Handle, max_concurrent: usize) -> Self {
        Self::build(handle, None, max_concurrent)
    }

    /// Pool on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current(max_concurrent: usize) -> Self {
        Self::on_handle(Handle::current(), max_concurrent)
    }

    fn build(handle: Handle, runtime: Option<Runtime>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            handle,
            runtime: Mutex::new(runtime),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Run `job` once a slot is free.
    ///
    /// Never blocks. The receiver yields the job's output, or an error if
    /// the job was dropped (pool shut down before it ran).
    pub fn spawn<F, T>(&self, job: F) -> Result<oneshot::Receiver<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown);
        }
        let (tx, rx) = oneshot::channel();
        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();

        self.tracker.spawn_on(
            async move {
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("Dropping queued planning job on shutdown");
                        return;
                    }
                    permit = permits.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return;
                };
                let output = job.await;
                // The receiver may be gone (agent reset); nothing to do then
                let _ = tx.send(output);
            },
            &self.handle,
        );
        Ok(rx)
    }

    /// Token cancelled when the pool shuts down. Request tokens are derived
    /// from it so that shutdown reaches work already running.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Jobs spawned and not yet finished, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Refuse new jobs and cancel everything still running or queued.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!(in_flight = self.in_flight(), "Shutting down planning worker pool");
        }
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Close the pool and wait for every job to finish.
    pub async fn drain(&self) {
        self.close();
        self.tracker.wait().await;
    }

    /// Close the pool and, for a dedicated pool, stop its runtime, waiting
    /// at most `timeout` for jobs to observe cancellation.
    ///
    /// Must not be called from inside an async context.
    pub fn shutdown_blocking(&self, timeout: Duration) {
        self.close();
        let runtime = lock(&self.runtime).take();
        if let Some(runtime) = runtime {
            let tracker = self.tracker.clone();
            if runtime
                .block_on(async { tokio::time::timeout(timeout, tracker.wait()).await })
                .is_err()
            {
                warn!(
                    in_flight = self.in_flight(),
                    "Planning jobs did not finish before shutdown timeout"
                );
            }
            runtime.shutdown_timeout(timeout);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let runtime = lock(&self.runtime).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrent", &self.max_concurrent)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
