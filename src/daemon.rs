//! Daemon assembly: wires the task queue, dispatch loop, and ingestion
//! server together and coordinates graceful shutdown.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{DispatchLoop, TaskExecutor};
use crate::error::{Error, Result};
use crate::task_queue::{self, TaskReceiver, TaskSender};
use crate::types::Task;

/// Top-level daemon instance.
///
/// Owns the producer side of the task queue and the shutdown token; the
/// consumer side is handed to the dispatch loop by [`start_dispatcher`].
/// Cheap to share via `Arc` - the ingestion server holds one handle, the
/// operator-facing signal handling another.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dl_daemon::{Config, Daemon, LoggingExecutor, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let daemon = Arc::new(Daemon::new(Config::default(), Arc::new(LoggingExecutor))?);
///     let dispatcher = daemon.start_dispatcher()?;
///     daemon.spawn_api_server();
///
///     run_with_shutdown(daemon).await?;
///     dispatcher.await?;
///     Ok(())
/// }
/// ```
///
/// [`start_dispatcher`]: Daemon::start_dispatcher
pub struct Daemon {
    config: Arc<Config>,
    queue: TaskSender,
    dispatch_rx: Mutex<Option<TaskReceiver>>,
    executor: Arc<dyn TaskExecutor>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a daemon with the given configuration and execution collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: Config, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        config.validate()?;
        let (queue, dispatch_rx) = task_queue::queue();
        Ok(Self {
            config: Arc::new(config),
            queue,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            executor,
            shutdown: CancellationToken::new(),
        })
    }

    /// Current configuration (cheap Arc clone)
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Producer handle to the task queue, for ingestion paths
    pub fn task_sender(&self) -> TaskSender {
        self.queue.clone()
    }

    /// Enqueue a fully-formed task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the dispatch loop has stopped.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        self.queue.enqueue(task)
    }

    /// Cooperative shutdown signal shared with the dispatch loop
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the dispatch loop as a background task.
    ///
    /// The loop is the queue's only consumer; this can be called once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatcher`] if the dispatch loop was already started.
    pub fn start_dispatcher(&self) -> Result<tokio::task::JoinHandle<()>> {
        let rx = self
            .dispatch_rx
            .lock()
            .map_err(|_| Error::Dispatcher("dispatcher state poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::Dispatcher("dispatcher already started".to_string()))?;

        let dispatch = DispatchLoop::new(rx, Arc::clone(&self.executor), self.shutdown.clone());
        Ok(tokio::spawn(dispatch.run()))
    }

    /// Spawn the ingestion server in a background task.
    ///
    /// The server runs concurrently with dispatch and listens on the
    /// configured bind address (default: 127.0.0.1:8092).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let daemon = Arc::clone(self);
        let config = self.config();

        tokio::spawn(async move { crate::api::start_api_server(daemon, config).await })
    }

    /// Initiate graceful shutdown.
    ///
    /// Fires the cooperative shutdown signal: if the dispatch loop is idle it
    /// stops immediately; if a task is mid-execution, the loop delegates to
    /// the executor's own shutdown contract before stopping. Already-queued
    /// tasks are dropped - the queue is not persistent by design.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.cancel();
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LoggingExecutor;
    use crate::types::TaskSpec;
    use std::time::Duration;

    fn daemon() -> Daemon {
        Daemon::new(Config::default(), Arc::new(LoggingExecutor)).unwrap()
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let mut config = Config::default();
        config.chunk_buffer.prefill = 99;
        let result = Daemon::new(config, Arc::new(LoggingExecutor));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn dispatcher_can_only_be_started_once() {
        let daemon = daemon();
        let handle = daemon.start_dispatcher().unwrap();
        assert!(matches!(
            daemon.start_dispatcher(),
            Err(Error::Dispatcher(_))
        ));
        daemon.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn enqueued_task_reaches_the_dispatcher() {
        let daemon = daemon();
        let handle = daemon.start_dispatcher().unwrap();

        daemon
            .enqueue(Task::new(TaskSpec::File {
                url: "http://x/a.mp4".to_string(),
                file_name: "a.mp4".to_string(),
                p_range: None,
                headers: None,
            }))
            .unwrap();

        // LoggingExecutor consumes it; shutdown stops the loop afterwards
        tokio::time::sleep(Duration::from_millis(50)).await;
        daemon.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
