//! Core types for dl-daemon

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::chunk_channel::ChunkReceiver;

/// Placeholder substituted for the inline `data` field when a task is logged
pub const REDACTED_DATA: &str = "...";

/// A download job description as submitted by a client
///
/// This is the wire format: the `type` field discriminates the variants and
/// field names match what clients send (`fileName`, `pRange`). Required
/// fields are validated at decode time; an unknown `type` or a missing
/// required field is a decode error, answered with `failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskSpec {
    /// Direct fetch of a single remote file
    File {
        /// Source URL (or local playlist path)
        url: String,
        /// Destination file name
        #[serde(rename = "fileName")]
        file_name: String,
        /// Optional part range for multi-part sources, e.g. "1 3"
        #[serde(rename = "pRange", default, skip_serializing_if = "Option::is_none")]
        p_range: Option<String>,
        /// Optional request headers to present to the source
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },

    /// HLS playlist job, optionally carrying the playlist text inline
    Hls {
        /// Playlist URL (or local path)
        url: String,
        /// Destination file name
        #[serde(rename = "fileName")]
        file_name: String,
        /// Optional part range for multi-part sources
        #[serde(rename = "pRange", default, skip_serializing_if = "Option::is_none")]
        p_range: Option<String>,
        /// Optional request headers to present to the source
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
        /// Inline playlist text; can be large, always redacted in logs
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },

    /// Stream task: binary content arrives incrementally over the
    /// submitting connection rather than being fetched by the executor
    Stream {
        /// Destination file name
        #[serde(rename = "fileName")]
        file_name: String,
        /// Optional headers describing the streamed content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
}

impl TaskSpec {
    /// Destination file name for this job
    pub fn file_name(&self) -> &str {
        match self {
            TaskSpec::File { file_name, .. }
            | TaskSpec::Hls { file_name, .. }
            | TaskSpec::Stream { file_name, .. } => file_name,
        }
    }

    /// True if the task's content is streamed by the client
    pub fn is_stream(&self) -> bool {
        matches!(self, TaskSpec::Stream { .. })
    }

    /// JSON form of the task safe for logging: the inline `data` field, if
    /// present, is replaced by [`REDACTED_DATA`] so payload bytes never
    /// flood the log output.
    pub fn redacted_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self);
        if let Some(obj) = value.as_object_mut() {
            if obj.contains_key("data") {
                obj.insert(
                    "data".to_string(),
                    serde_json::Value::String(REDACTED_DATA.to_string()),
                );
            }
        }
        value
    }
}

/// One unit of streamed binary content: a decoded descriptor header plus the
/// opaque payload bytes. Delivered to the executor in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Arbitrary descriptor fields decoded from the textual chunk header
    pub descriptor: serde_json::Map<String, serde_json::Value>,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Consumer-side handle to a stream task's transport
///
/// Attached to a [`Task`] by ingestion before it is enqueued. The executor
/// pulls successive chunks from `chunks`; cancelling `connection` asks the
/// owning connection to close its socket (the typed replacement for the
/// original design's stored close callback). The token also fires when the
/// client disconnects on its own, though the close sentinel observed through
/// `chunks` remains the authoritative end-of-stream signal.
#[derive(Debug)]
pub struct StreamHandle {
    /// Receiving end of the task's chunk channel
    pub chunks: ChunkReceiver,
    /// Close handle to the owning connection
    pub connection: CancellationToken,
}

/// A task as it travels through the queue to the dispatch loop
///
/// Owned by the queue until dequeued, by the dispatch loop afterwards, and
/// dropped when execution returns. There is no persistence.
#[derive(Debug)]
pub struct Task {
    /// The client-submitted job description
    pub spec: TaskSpec,
    /// When ingestion accepted the task
    pub received_at: DateTime<Utc>,
    stream: Option<StreamHandle>,
}

impl Task {
    /// Wrap a one-shot task description
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            received_at: Utc::now(),
            stream: None,
        }
    }

    /// Wrap a stream task description with its transport handle
    pub fn with_stream(spec: TaskSpec, stream: StreamHandle) -> Self {
        Self {
            spec,
            received_at: Utc::now(),
            stream: Some(stream),
        }
    }

    /// Destination file name for this job
    pub fn file_name(&self) -> &str {
        self.spec.file_name()
    }

    /// Take ownership of the stream handle, if this is a stream task
    ///
    /// Returns `None` for one-shot tasks and on any call after the first.
    pub fn take_stream(&mut self) -> Option<StreamHandle> {
        self.stream.take()
    }

    /// True if a stream handle is still attached
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_task_round_trips_exactly() {
        let json = r#"{"type":"file","fileName":"a.mp4","url":"http://x/a.mp4"}"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.file_name(), "a.mp4");
        assert!(!spec.is_stream());

        let back = serde_json::to_value(&spec).unwrap();
        let original: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn stream_task_is_recognized() {
        let spec: TaskSpec =
            serde_json::from_str(r#"{"type":"stream","fileName":"b.ts"}"#).unwrap();
        assert!(spec.is_stream());
        assert_eq!(spec.file_name(), "b.ts");
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let result: Result<TaskSpec, _> =
            serde_json::from_str(r#"{"type":"torrent","fileName":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_required_field_is_a_decode_error() {
        let result: Result<TaskSpec, _> = serde_json::from_str(r#"{"type":"file","url":"u"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn redacted_json_hides_inline_data() {
        let spec: TaskSpec = serde_json::from_str(
            r##"{"type":"hls","fileName":"c.mp4","url":"http://x/c.m3u8","data":"#EXTM3U very long playlist"}"##,
        )
        .unwrap();
        let logged = spec.redacted_json();
        assert_eq!(logged["data"], REDACTED_DATA);
        assert!(!logged.to_string().contains("EXTM3U"));
        // other fields are untouched
        assert_eq!(logged["fileName"], "c.mp4");
    }

    #[test]
    fn redacted_json_leaves_tasks_without_data_alone() {
        let spec: TaskSpec =
            serde_json::from_str(r#"{"type":"file","fileName":"a.mp4","url":"u"}"#).unwrap();
        let logged = spec.redacted_json();
        assert!(logged.get("data").is_none());
    }
}
