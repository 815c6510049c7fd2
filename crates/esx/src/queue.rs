// ai
//! 🚰 The Dispatch Queue — one bounded pipe, many thirsty workers.
//!
//! 🎬 *[a producer writes. the queue fills. 4096 requests stand in line like it's a
//! concert ticket drop. the 4097th producer waits. patiently. it has no choice.]*
//!
//! 🧠 Knowledge graph:
//! - Backed by `async_channel::bounded`: multi-producer, multi-consumer, and competitive.
//!   Each [`WriteRequest`] is delivered to exactly ONE worker. No broadcasting. No dupes.
//! - [`DispatchQueue::enqueue`] awaits when full. This is THE backpressure point.
//!   No drop-oldest, no silent loss.
//! - [`DispatchQueue::close`] makes every pending and future `enqueue` fail with
//!   [`QueueClosed`]. Loud, typed, downcastable.
//!
//! 🦆 The duck stood in this queue once. It's still waiting. It has a good book.

use std::fmt;

use async_channel::{Receiver, Sender};
use serde_json::{Map, Value, json};

/// 📬 Default capacity. A few thousand requests of slack for a slow backend.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// 📦 A backend-bound unit of work: destination + payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub index: String,
    pub doc: Map<String, Value>,
}

impl WriteRequest {
    pub fn new(index: impl Into<String>, doc: Map<String, Value>) -> Self {
        Self {
            index: index.into(),
            doc,
        }
    }

    /// 📡 Append this request's two `_bulk` NDJSON lines (action, then source) to `out`.
    pub fn write_bulk_lines(&self, out: &mut String) -> serde_json::Result<()> {
        let action = json!({ "index": { "_index": self.index } });
        out.push_str(&serde_json::to_string(&action)?);
        out.push('\n');
        out.push_str(&serde_json::to_string(&self.doc)?);
        out.push('\n');
        Ok(())
    }
}

/// 💀 The queue has been closed. Whatever you were holding, it's not going in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "💀 dispatch queue is closed; the ingestion client has shut down")
    }
}

impl std::error::Error for QueueClosed {}

/// 🚰 The producer side plus a way to mint consumer handles.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: Sender<WriteRequest>,
    rx: Receiver<WriteRequest>,
}

impl DispatchQueue {
    /// 🏗️ A fresh queue. Capacity 0 is bumped to 1, since a zero-slot channel is a bug report.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// 📥 A consumer handle. Every handle competes for the same items.
    pub fn consumer(&self) -> Receiver<WriteRequest> {
        self.rx.clone()
    }

    /// 📬 Enqueue, waiting for room if needed.
    pub async fn enqueue(&self, request: WriteRequest) -> Result<(), QueueClosed> {
        self.tx.send(request).await.map_err(|_| QueueClosed)
    }

    /// 🔒 Close both ends. Returns `true` if this call did the closing.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}
