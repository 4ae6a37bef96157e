//! The shared task queue between ingestion and dispatch.
//!
//! One unbounded FIFO per daemon: every ingestion path (one-shot handlers,
//! connection handlers) holds a cloned [`TaskSender`]; the dispatch loop owns
//! the single [`TaskReceiver`]. The handles are constructed once at startup
//! and passed explicitly - there is no ambient global queue, which keeps
//! lifecycle and test isolation obvious.
//!
//! Guarantees: removal order equals global insertion order, and every task
//! inserted is removed exactly once as long as the consumer runs.

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::Task;

/// Producer handle to the task queue (cheaply cloneable, multi-producer)
#[derive(Clone, Debug)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<Task>,
}

/// Consumer handle to the task queue (single consumer, held by the dispatch loop)
#[derive(Debug)]
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<Task>,
}

/// Create a fresh task queue.
pub fn queue() -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskSender { tx }, TaskReceiver { rx })
}

impl TaskSender {
    /// Append a task to the queue.
    ///
    /// Never blocks (the queue is unbounded).
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the dispatch loop has stopped and
    /// dropped the consumer side - the task is not enqueued.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        self.tx.send(task).map_err(|_| Error::QueueClosed)
    }
}

impl TaskReceiver {
    /// Remove the oldest task, awaiting while the queue is empty.
    ///
    /// Returns `None` once every producer handle has been dropped and the
    /// queue has drained.
    pub async fn recv(&mut self) -> Option<Task> {
        self.rx.recv().await
    }
}
