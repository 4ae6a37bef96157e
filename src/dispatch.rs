//! Task dispatch: the single consumer side of the task queue.
//!
//! The dispatch loop pulls tasks in FIFO order and runs them one at a time
//! through a [`TaskExecutor`] - the collaborator that does the actual
//! fetching/processing. Only one task executes at a time; the loop does not
//! pull the next task until the current execution call returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::task_queue::TaskReceiver;
use crate::types::Task;

/// The execution collaborator invoked for each dequeued task.
///
/// Implementations perform the actual download/processing work. For stream
/// tasks, the implementation pulls successive chunks via the task's
/// [`StreamHandle`](crate::types::StreamHandle) until `next_chunk` returns
/// `None`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one task to completion or failure.
    ///
    /// A returned error marks the task failed; the dispatch loop logs it and
    /// moves on. There is no retry and no return channel to the client.
    async fn execute(&self, task: Task) -> Result<()>;

    /// Gracefully stop the currently executing task.
    ///
    /// Called when the operator interrupts the daemon while a task is in
    /// flight. Implementations should stop promptly and leave partial output
    /// in whatever state their own contract defines.
    async fn shutdown(&self);

    /// Executor name for log lines
    fn name(&self) -> &str {
        "executor"
    }
}

/// Executor that logs tasks and discards their content.
///
/// Drains stream tasks to keep their producers from blocking forever.
/// Useful as a stand-in during wiring and in tests.
pub struct LoggingExecutor;

#[async_trait]
impl TaskExecutor for LoggingExecutor {
    async fn execute(&self, mut task: Task) -> Result<()> {
        let file_name = task.file_name().to_string();
        match task.take_stream() {
            Some(mut stream) => {
                let mut chunks = 0u64;
                let mut bytes = 0u64;
                while let Some(chunk) = stream.chunks.next_chunk().await {
                    chunks += 1;
                    bytes += chunk.payload.len() as u64;
                }
                tracing::info!(file_name = %file_name, chunks, bytes, "Discarded streamed task");
            }
            None => {
                tracing::info!(file_name = %file_name, "Discarded one-shot task");
            }
        }
        Ok(())
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "logging"
    }
}

/// Single long-lived consumer of the task queue.
///
/// Runs until the shutdown token fires or every producer handle is gone.
/// The shutdown signal is cooperative: between tasks it stops the loop
/// immediately; while a task executes it drops the in-flight execution
/// future and delegates to [`TaskExecutor::shutdown`] so the collaborator
/// can wind down on its own terms.
pub struct DispatchLoop {
    queue: TaskReceiver,
    executor: Arc<dyn TaskExecutor>,
    shutdown: CancellationToken,
}

impl DispatchLoop {
    /// Wire a dispatch loop to its queue, executor, and shutdown signal.
    pub fn new(
        queue: TaskReceiver,
        executor: Arc<dyn TaskExecutor>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            executor,
            shutdown,
        }
    }

    /// Run the loop to completion.
    pub async fn run(mut self) {
        tracing::info!(executor = self.executor.name(), "Dispatch loop started");
        loop {
            let task = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested while idle, stopping dispatch loop");
                    break;
                }
                task = self.queue.recv() => match task {
                    Some(task) => task,
                    None => {
                        tracing::info!("Task queue closed, stopping dispatch loop");
                        break;
                    }
                },
            };

            tracing::info!(file_name = %task.file_name(), "Handling task");
            tokio::select! {
                result = self.executor.execute(task) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Task execution failed");
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested mid-task, stopping executor gracefully");
                    self.executor.shutdown().await;
                    break;
                }
            }
        }
        tracing::info!("Dispatch loop stopped");
    }
}
