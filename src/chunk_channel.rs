//! Bounded per-stream chunk channel.
//!
//! Each stream task gets exactly one chunk channel: the connection handler is
//! the producer, task execution is the consumer. The channel is the flow
//! control between them - the producer awaits while `capacity` items are
//! buffered, so a slow executor stalls the network side instead of buffering
//! the whole stream in memory.
//!
//! At construction the channel is pre-seeded with placeholder entries
//! (configurable, default one per slot). The producer therefore starts out
//! seeing a full buffer and cannot race ahead until the consumer has drained
//! the placeholders. The consumer skips placeholders transparently, so the
//! setting never affects what `next_chunk` yields.
//!
//! Termination is in-band: a close sentinel is pushed when the connection
//! ends (subject to the same capacity blocking as data), guaranteeing a
//! blocked or future receive observes the end of the stream instead of
//! hanging. The sentinel is terminal - once observed, `next_chunk` returns
//! `None` forever.

use tokio::sync::mpsc;

use crate::config::ChunkBufferConfig;
use crate::error::{Error, Result};
use crate::types::Chunk;

/// What travels through a chunk channel
#[derive(Clone, Debug)]
pub(crate) enum StreamItem {
    /// Pre-seeded entry, skipped by the consumer
    Placeholder,
    /// One unit of streamed content
    Chunk(Chunk),
    /// Close sentinel: no further chunks will arrive
    Closed,
}

/// Producer half of a stream task's chunk channel
///
/// Held by the connection handler that owns the stream.
#[derive(Clone, Debug)]
pub struct ChunkSender {
    tx: mpsc::Sender<StreamItem>,
}

/// Consumer half of a stream task's chunk channel
///
/// Travels with the [`Task`](crate::types::Task) to the executor.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::Receiver<StreamItem>,
    closed: bool,
}

/// Create a chunk channel for one stream task, pre-seeded per `config`.
///
/// `config` must have been validated: `capacity >= 1` and
/// `prefill <= capacity`.
pub fn channel(config: &ChunkBufferConfig) -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    for _ in 0..config.prefill.min(config.capacity) {
        // Cannot fail: the channel is fresh and prefill <= capacity
        if tx.try_send(StreamItem::Placeholder).is_err() {
            break;
        }
    }
    (
        ChunkSender { tx },
        ChunkReceiver { rx, closed: false },
    )
}

impl ChunkSender {
    /// Append a chunk, awaiting while the channel is at capacity.
    ///
    /// Backpressure is latency, never a failure; the only error is the
    /// consumer side having gone away.
    pub async fn send(&self, chunk: Chunk) -> Result<()> {
        self.tx
            .send(StreamItem::Chunk(chunk))
            .await
            .map_err(|_| Error::StreamClosed)
    }

    /// Push the close sentinel, awaiting while the channel is at capacity.
    ///
    /// Terminal by contract: no chunk may be sent after this. A consumer
    /// that already went away is not an error - the stream is over either way.
    pub async fn close(self) {
        let _ = self.tx.send(StreamItem::Closed).await;
    }

    /// Remaining buffer slots (0 = producer would block)
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

impl ChunkReceiver {
    /// Pull the next chunk, awaiting while the channel is empty.
    ///
    /// Placeholder entries are skipped. Returns `None` once the close
    /// sentinel is observed, or if the producer side is gone without one
    /// (the connection task was torn down); after that every call returns
    /// `None`.
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        if self.closed {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Some(StreamItem::Placeholder) => continue,
                Some(StreamItem::Chunk(chunk)) => return Some(chunk),
                Some(StreamItem::Closed) | None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// True once the close sentinel (or producer loss) has been observed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
