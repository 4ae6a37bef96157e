//! Configuration types for dl-daemon

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::ToSchema;

/// Top-level configuration
///
/// All fields have sensible defaults; a `Config::default()` daemon listens on
/// localhost and buffers ten chunks per stream task.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Ingestion server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-stream chunk buffer settings
    #[serde(default)]
    pub chunk_buffer: ChunkBufferConfig,
}

/// Ingestion server configuration (bind address, CORS)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket server binds to (default: 127.0.0.1:8092)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS headers on the one-shot submission endpoint
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins ("*" or empty list = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// Chunk buffer configuration for stream tasks
///
/// Each stream task gets its own bounded chunk channel of `capacity` slots.
/// At construction the channel is pre-seeded with `prefill` placeholder
/// entries, so the network producer starts out seeing a full buffer and the
/// executor gets a deterministic backpressure window before real data flows.
/// Set `prefill` to 0 to start the buffer empty instead.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChunkBufferConfig {
    /// Maximum buffered chunks per stream task (default: 10)
    #[serde(default = "default_chunk_capacity")]
    pub capacity: usize,

    /// Placeholder entries pre-seeded at channel construction (default: capacity)
    #[serde(default = "default_chunk_capacity")]
    pub prefill: usize,
}

impl Default for ChunkBufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_chunk_capacity(),
            prefill: default_chunk_capacity(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    // Safe: literal address
    #[allow(clippy::unwrap_used)]
    "127.0.0.1:8092".parse().unwrap()
}

fn default_chunk_capacity() -> usize {
    10
}

impl Config {
    /// Validate configuration invariants
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key if the chunk buffer
    /// capacity is zero or the prefill count exceeds the capacity.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_buffer.capacity == 0 {
            return Err(Error::Config {
                message: "chunk buffer capacity must be at least 1".to_string(),
                key: Some("chunk_buffer.capacity".to_string()),
            });
        }
        if self.chunk_buffer.prefill > self.chunk_buffer.capacity {
            return Err(Error::Config {
                message: format!(
                    "prefill ({}) exceeds capacity ({})",
                    self.chunk_buffer.prefill, self.chunk_buffer.capacity
                ),
                key: Some("chunk_buffer.prefill".to_string()),
            });
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_buffer.capacity, 10);
        assert_eq!(config.chunk_buffer.prefill, 10);
        assert_eq!(config.server.bind_address.port(), 8092);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_buffer.capacity, 10);
    }

    #[test]
    fn prefill_may_be_disabled() {
        let config: Config =
            serde_json::from_str(r#"{"chunk_buffer":{"prefill":0}}"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_buffer.prefill, 0);
        assert_eq!(config.chunk_buffer.capacity, 10);
    }

    #[test]
    fn prefill_above_capacity_is_rejected() {
        let mut config = Config::default();
        config.chunk_buffer.prefill = 11;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prefill"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = Config::default();
        config.chunk_buffer.capacity = 0;
        assert!(config.validate().is_err());
    }
}
