//! Persistent-connection handling: the per-connection state machine and the
//! WebSocket glue around it.
//!
//! The state machine itself is transport-agnostic - it consumes raw byte
//! messages and produces `success`/`failed` replies - so it can be exercised
//! directly in tests. [`handle_socket`] wires it to an axum WebSocket.
//!
//! Protocol: the first message is a serialized [`TaskSpec`]. If it describes
//! a stream task, every later message on the connection is one chunk frame:
//! a JSON descriptor header, a `\r\n` delimiter, then the raw payload bytes.
//! Each message is answered with the literal string `success` or `failed`
//! before the next message is read; handling within one connection is
//! strictly sequential, distinct connections run in parallel tasks.

use axum::extract::ws::{Message, WebSocket};
use tokio_util::sync::CancellationToken;

use crate::chunk_channel::{self, ChunkSender};
use crate::config::ChunkBufferConfig;
use crate::error::{Error, Result};
use crate::task_queue::TaskSender;
use crate::types::{Chunk, StreamHandle, Task, TaskSpec};

/// Reply body for an accepted message
pub const REPLY_SUCCESS: &str = "success";
/// Reply body for a rejected message
pub const REPLY_FAILED: &str = "failed";

/// Separator between a chunk's descriptor header and its binary payload
const CHUNK_DELIMITER: &[u8] = b"\r\n";

/// Lifecycle state of one persistent connection
///
/// There is no explicit terminal value - connection teardown is a transport
/// event, observed through [`Connection::on_close`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection open, waiting for a task message
    Established,
    /// A stream task was accepted; subsequent messages are chunk frames
    InTransit,
}

/// State machine for one persistent client session.
///
/// Mutated only by the connection's own handling task, so no locking is
/// needed around the state. The connection shares its stream task's chunk
/// channel (producer side) but does not own the task's lifetime.
pub struct Connection {
    state: ConnectionState,
    queue: TaskSender,
    chunk_buffer: ChunkBufferConfig,
    token: CancellationToken,
    stream: Option<ChunkSender>,
}

impl Connection {
    /// New connection in the `Established` state.
    pub fn new(queue: TaskSender, chunk_buffer: ChunkBufferConfig) -> Self {
        Self {
            state: ConnectionState::Established,
            queue,
            chunk_buffer,
            token: CancellationToken::new(),
            stream: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Close handle for this connection.
    ///
    /// Fires when the connection should be (or has been) torn down; the same
    /// token is handed to the stream task so the executor can ask the
    /// transport to close.
    pub fn close_signal(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Process one incoming message, returning the reply to send back.
    ///
    /// May await on chunk-channel backpressure; never fails the connection -
    /// a malformed message is answered with `failed` and discarded.
    pub async fn on_message(&mut self, msg: &[u8]) -> &'static str {
        let result = match self.state {
            ConnectionState::Established => self.accept_task(msg).await,
            ConnectionState::InTransit => self.accept_chunk(msg).await,
        };
        match result {
            Ok(()) => REPLY_SUCCESS,
            Err(e) => {
                if e.is_client_fault() {
                    tracing::debug!(error = %e, state = ?self.state, "Rejected message");
                } else {
                    tracing::warn!(error = %e, state = ?self.state, "Failed to accept message");
                }
                REPLY_FAILED
            }
        }
    }

    /// Connection closed (client left or transport error).
    ///
    /// Pushes the close sentinel into the stream task's chunk channel, if
    /// one was attached, so a blocked or future consumer observes
    /// termination rather than hanging. Subject to the same capacity
    /// blocking as ordinary chunks.
    pub async fn on_close(&mut self) {
        self.token.cancel();
        if let Some(stream) = self.stream.take() {
            tracing::debug!("Connection closed mid-stream, pushing close sentinel");
            stream.close().await;
        }
    }

    async fn accept_task(&mut self, msg: &[u8]) -> Result<()> {
        let spec: TaskSpec = serde_json::from_slice(msg)?;
        tracing::info!(task = %spec.redacted_json(), "Received task");

        if spec.is_stream() {
            let (chunk_tx, chunk_rx) = chunk_channel::channel(&self.chunk_buffer);
            let task = Task::with_stream(
                spec,
                StreamHandle {
                    chunks: chunk_rx,
                    connection: self.token.clone(),
                },
            );
            self.queue.enqueue(task)?;
            // Transition only after the task is safely enqueued
            self.stream = Some(chunk_tx);
            self.state = ConnectionState::InTransit;
        } else {
            self.queue.enqueue(Task::new(spec))?;
        }
        Ok(())
    }

    async fn accept_chunk(&mut self, msg: &[u8]) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(Error::StreamClosed)?;

        let delim = msg
            .windows(CHUNK_DELIMITER.len())
            .position(|window| window == CHUNK_DELIMITER)
            .ok_or(Error::Frame("missing descriptor delimiter"))?;
        let descriptor: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&msg[..delim])?;
        let payload = msg[delim + CHUNK_DELIMITER.len()..].to_vec();

        // Awaits while the chunk channel is at capacity (flow control)
        stream.send(Chunk { descriptor, payload }).await
    }
}

/// Drive one WebSocket through the connection state machine.
///
/// Runs as its own tokio task for the socket's lifetime. The loop also
/// watches the connection's close token so an executor-initiated close
/// tears the socket down.
pub(crate) async fn handle_socket(
    mut socket: WebSocket,
    queue: TaskSender,
    chunk_buffer: ChunkBufferConfig,
) {
    let mut conn = Connection::new(queue, chunk_buffer);
    let close = conn.close_signal();
    tracing::debug!("Client connected");

    loop {
        let incoming = tokio::select! {
            _ = close.cancelled() => {
                tracing::debug!("Close requested, shutting WebSocket down");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => incoming,
        };

        let msg = match incoming {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket transport error");
                break;
            }
            None => break,
        };

        let reply = match msg {
            Message::Text(text) => conn.on_message(text.as_bytes()).await,
            Message::Binary(data) => conn.on_message(&data).await,
            Message::Close(_) => break,
            // Pings are answered by axum itself
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if socket.send(Message::Text(reply.to_string())).await.is_err() {
            tracing::debug!("Client went away before reply could be sent");
            break;
        }
    }

    conn.on_close().await;
    tracing::debug!("Client left");
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_queue;

    fn no_prefill() -> ChunkBufferConfig {
        ChunkBufferConfig {
            capacity: 10,
            prefill: 0,
        }
    }

    #[tokio::test]
    async fn one_shot_task_keeps_connection_established() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());

        let reply = conn
            .on_message(br#"{"type":"file","fileName":"a.mp4","url":"http://x/a.mp4"}"#)
            .await;
        assert_eq!(reply, REPLY_SUCCESS);
        assert_eq!(conn.state(), ConnectionState::Established);

        let task = rx.recv().await.unwrap();
        assert_eq!(task.file_name(), "a.mp4");
        assert!(!task.has_stream());
    }

    #[tokio::test]
    async fn stream_task_enters_in_transit() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());

        let reply = conn
            .on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        assert_eq!(reply, REPLY_SUCCESS);
        assert_eq!(conn.state(), ConnectionState::InTransit);

        let task = rx.recv().await.unwrap();
        assert!(task.has_stream());
    }

    #[tokio::test]
    async fn malformed_task_replies_failed_and_stays_established() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());

        assert_eq!(conn.on_message(b"not json at all").await, REPLY_FAILED);
        assert_eq!(conn.state(), ConnectionState::Established);
        // Nothing was enqueued
        drop(conn);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn chunk_frame_is_decoded_and_delivered() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let mut task = rx.recv().await.unwrap();
        let mut stream = task.take_stream().unwrap();

        let reply = conn.on_message(b"{\"seq\":0}\r\n\x00\x01").await;
        assert_eq!(reply, REPLY_SUCCESS);

        let chunk = stream.chunks.next_chunk().await.unwrap();
        assert_eq!(chunk.descriptor["seq"], 0);
        assert_eq!(chunk.payload, vec![0x00, 0x01]);
    }

    #[tokio::test]
    async fn empty_payload_is_a_valid_chunk() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let mut task = rx.recv().await.unwrap();
        let mut stream = task.take_stream().unwrap();

        assert_eq!(conn.on_message(b"{\"seq\":1}\r\n").await, REPLY_SUCCESS);
        let chunk = stream.chunks.next_chunk().await.unwrap();
        assert!(chunk.payload.is_empty());
    }

    #[tokio::test]
    async fn frame_without_delimiter_is_rejected() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let _task = rx.recv().await.unwrap();

        assert_eq!(conn.on_message(b"{\"seq\":0}").await, REPLY_FAILED);
        assert_eq!(conn.state(), ConnectionState::InTransit);
    }

    #[tokio::test]
    async fn frame_with_bad_header_is_rejected() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let _task = rx.recv().await.unwrap();

        assert_eq!(conn.on_message(b"not json\r\npayload").await, REPLY_FAILED);
        // The connection stays usable for well-formed frames
        assert_eq!(conn.on_message(b"{}\r\nok").await, REPLY_SUCCESS);
    }

    #[tokio::test]
    async fn second_task_message_mid_stream_is_rejected() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let _task = rx.recv().await.unwrap();

        // No delimiter, so it cannot be a chunk frame either
        let reply = conn
            .on_message(br#"{"type":"file","fileName":"a.mp4","url":"u"}"#)
            .await;
        assert_eq!(reply, REPLY_FAILED);
    }

    #[tokio::test]
    async fn close_pushes_the_sentinel_and_cancels_the_token() {
        let (tx, mut rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let mut task = rx.recv().await.unwrap();
        let mut stream = task.take_stream().unwrap();

        conn.on_message(b"{\"seq\":0}\r\nabc").await;
        conn.on_close().await;

        assert!(stream.connection.is_cancelled());
        // Buffered chunk still arrives, then the stream terminates for good
        assert_eq!(stream.chunks.next_chunk().await.unwrap().payload, b"abc");
        assert!(stream.chunks.next_chunk().await.is_none());
        assert!(stream.chunks.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn close_without_stream_task_is_a_no_op() {
        let (tx, _rx) = task_queue::queue();
        let mut conn = Connection::new(tx, no_prefill());
        conn.on_message(br#"{"type":"file","fileName":"a.mp4","url":"u"}"#)
            .await;
        conn.on_close().await;
    }

    #[tokio::test]
    async fn prefilled_buffer_backpressures_the_producer() {
        let (tx, mut rx) = task_queue::queue();
        let config = ChunkBufferConfig {
            capacity: 2,
            prefill: 2,
        };
        let mut conn = Connection::new(tx, config);
        conn.on_message(br#"{"type":"stream","fileName":"b.ts"}"#)
            .await;
        let mut task = rx.recv().await.unwrap();
        let mut stream = task.take_stream().unwrap();

        // Channel starts full of placeholders: the first chunk push must wait
        // until the consumer drains. Run producer and consumer concurrently.
        let producer = tokio::spawn(async move {
            let reply = conn.on_message(b"{\"seq\":0}\r\nxy").await;
            assert_eq!(reply, REPLY_SUCCESS);
            conn.on_close().await;
        });

        let chunk = stream.chunks.next_chunk().await.unwrap();
        assert_eq!(chunk.payload, b"xy");
        assert!(stream.chunks.next_chunk().await.is_none());
        producer.await.unwrap();
    }
}
