//! Error types for dl-daemon
//!
//! Errors in this crate fall into a small taxonomy:
//! - decode errors: a client sent a malformed payload; recovered locally by
//!   replying `failed` on the same transport, the connection stays usable
//! - queue/stream closure: the daemon is shutting down or a stream ended
//! - execution errors: the task executor failed a dequeued task; logged and
//!   the dispatch loop moves on
//!
//! No error here is fatal to the serving process.

use thiserror::Error;

/// Result type alias for dl-daemon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dl-daemon
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_buffer.prefill")
        key: Option<String>,
    },

    /// Malformed or non-conforming submitted payload
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Chunk message without a valid descriptor/payload frame
    #[error("malformed chunk frame: {0}")]
    Frame(&'static str),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task queue has been closed - not accepting new tasks
    #[error("task queue closed: not accepting new tasks")]
    QueueClosed,

    /// Chunk stream terminated before the operation could complete
    #[error("stream closed")]
    StreamClosed,

    /// The task executor failed a dequeued task
    #[error("task execution failed: {0}")]
    Execution(String),

    /// Dispatch loop lifecycle error
    #[error("dispatcher error: {0}")]
    Dispatcher(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServer(String),
}

impl Error {
    /// True if the error is recoverable by replying `failed` to the client
    /// and leaving the connection open.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Frame(_))
    }
}
