//! # dl-daemon
//!
//! Task-ingestion front end for media download jobs.
//!
//! dl-daemon accepts download tasks from remote clients over two transports -
//! a one-shot HTTP submission and a persistent WebSocket connection used for
//! client-originated binary streaming - and hands them to a single
//! [`TaskExecutor`] for execution, one task at a time, in submission order.
//!
//! ## Design
//!
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Explicit wiring** - the task queue and shutdown signal are constructed
//!   once and passed explicitly, never ambient globals
//! - **Backpressure over buffering** - streamed payloads flow through a
//!   bounded per-task chunk channel; a slow executor stalls the network
//!   producer instead of growing memory
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dl_daemon::{Config, Daemon, LoggingExecutor, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let daemon = Arc::new(Daemon::new(config, Arc::new(LoggingExecutor))?);
//!
//!     let dispatcher = daemon.start_dispatcher()?;
//!     daemon.spawn_api_server();
//!
//!     // Blocks until SIGTERM/SIGINT, then shuts down gracefully
//!     run_with_shutdown(daemon).await?;
//!     dispatcher.await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Ingestion server (HTTP one-shot + WebSocket streaming)
pub mod api;
/// Bounded per-stream chunk channel
pub mod chunk_channel;
/// Configuration types
pub mod config;
/// Daemon assembly and lifecycle
pub mod daemon;
/// Task dispatch loop and executor trait
pub mod dispatch;
/// Error types
pub mod error;
/// Shared task queue between ingestion and dispatch
pub mod task_queue;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use chunk_channel::{ChunkReceiver, ChunkSender};
pub use config::{ChunkBufferConfig, Config, ServerConfig};
pub use daemon::Daemon;
pub use dispatch::{DispatchLoop, LoggingExecutor, TaskExecutor};
pub use error::{Error, Result};
pub use task_queue::{TaskReceiver, TaskSender};
pub use types::{Chunk, StreamHandle, Task, TaskSpec};

use std::sync::Arc;

/// Helper function to run the daemon with graceful signal handling.
///
/// Waits for a termination signal and then calls the daemon's `shutdown()`
/// method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(daemon: Arc<Daemon>) -> Result<()> {
    wait_for_signal().await;
    daemon.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
