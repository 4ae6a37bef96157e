//! Application state for the ingestion server

use crate::{Config, Daemon};
use std::sync::Arc;

/// Shared state accessible to all route handlers
///
/// Cloned per request (cheap Arc clones); gives handlers the daemon's task
/// queue and the configuration.
#[derive(Clone)]
pub struct AppState {
    /// The daemon instance holding the task queue
    pub daemon: Arc<Daemon>,

    /// Configuration (chunk buffer sizing, CORS)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(daemon: Arc<Daemon>, config: Arc<Config>) -> Self {
        Self { daemon, config }
    }
}
