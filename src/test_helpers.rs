//! Shared test fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::dispatch::TaskExecutor;
use crate::error::{Error, Result};
use crate::types::{Task, TaskSpec};

/// Build a one-shot file task with the given destination name.
pub(crate) fn file_task(name: &str) -> Task {
    Task::new(TaskSpec::File {
        url: format!("http://x/{name}"),
        file_name: name.to_string(),
        p_range: None,
        headers: None,
    })
}

/// Records execution order; fails tasks whose name starts with "bad".
pub(crate) struct RecordingExecutor {
    pub(crate) seen: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn execute(&self, task: Task) -> Result<()> {
        let name = task.file_name().to_string();
        let failed = name.starts_with("bad");
        self.seen.lock().await.push(name.clone());
        if failed {
            Err(Error::Execution(name))
        } else {
            Ok(())
        }
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "recording"
    }
}
