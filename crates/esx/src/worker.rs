//! 🎬 *[a queue fills with write requests. somewhere, a worker waits.]*
//! *[the clock on the wall reads 2:47am. the flush timer reads 0.99s.]*
//! *[nobody asked for ten thousand log lines. and yet, here we are.]*
//!
//! 🗑️ The Worker: patient, tireless, and deeply unbothered by the chaos happening
//! upstream. It claims requests from the shared queue, piles them into a private batch,
//! and ships the batch as one bulk request when the batch is full or the timer says so.
//!
//! ```text
//!   Init ──▶ Running ──▶ Stopped
//!    │          │            │
//!    │          │            └─ dedicated connection closed; unflushed count logged
//!    │          └─ select! { request, tick, shutdown } (no favorites)
//!    └─ dedicated: connect once (failure logged, worker keeps draining)
//!       shared: nothing yet, every flush borrows its own connection
//! ```
//!
//! ⚠️ Shutdown does NOT flush. Whatever is in the batch when the token fires stays there.
//! The count is logged so nobody can say they weren't told.
//!
//! 🦆 (the duck has no comment at this time)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backends::{Connection, Connector, DeliveryConfig};
use crate::queue::WriteRequest;
use crate::stats::Stats;

/// 🚦 Lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Running,
    Stopped,
}

/// 🔀 How this worker reaches the backend. Picked once at Init.
#[derive(Debug)]
pub(crate) enum WorkerLink {
    /// 🔒 One long-lived connection. `None` when the connect at Init failed.
    Dedicated(Option<Box<dyn Connection>>),
    /// 🚇 A fresh connection per flush, closed right after.
    Shared(Arc<dyn Connector>),
}

/// ⏱️ When to flush: at `threshold` requests, or every `interval`, whichever comes first.
///
/// Both must be non-zero. [`IngestClient::new`](crate::client::IngestClient::new) refuses zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub threshold: usize,
    pub interval: Duration,
}

/// 🗑️ One batcher. Owns its batch and its link; shares only the queue.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    rx: Receiver<WriteRequest>,
    connector: Arc<dyn Connector>,
    shared: bool,
    flush: FlushPolicy,
    shutdown: CancellationToken,
    stats: Arc<Stats>,
    batch: Vec<WriteRequest>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        id: usize,
        rx: Receiver<WriteRequest>,
        connector: Arc<dyn Connector>,
        delivery: &DeliveryConfig,
        flush: FlushPolicy,
        shutdown: CancellationToken,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            id,
            rx,
            connector,
            shared: matches!(delivery, DeliveryConfig::Shared { .. }),
            flush,
            shutdown,
            stats,
            batch: Vec::with_capacity(flush.threshold),
            state: WorkerState::Init,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// 🚀 Spawn the worker loop. The handle resolves once the worker is Stopped.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut link = self.init().await;
        self.state = WorkerState::Running;
        debug!(worker = self.id, "📥 worker running");

        // -- first tick one full interval from now, not immediately
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush.interval, self.flush.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(worker = self.id, "🛑 shutdown signal received");
                    break;
                }
                received = self.rx.recv() => match received {
                    Ok(request) => {
                        self.batch.push(request);
                        if self.batch.len() >= self.flush.threshold {
                            trace!(worker = self.id, "📦 batch full, flushing");
                            self.flush_batch(&mut link).await;
                        }
                    }
                    Err(_) => {
                        debug!(worker = self.id, "🏁 queue closed and drained");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush_batch(&mut link).await;
                }
            }
        }

        self.stop(link).await;
    }

    async fn init(&self) -> WorkerLink {
        if self.shared {
            return WorkerLink::Shared(self.connector.clone());
        }
        match self.connector.connect().await {
            Ok(connection) => {
                info!(worker = self.id, "🔌 dedicated connection established");
                WorkerLink::Dedicated(Some(connection))
            }
            Err(err) => {
                error!(
                    worker = self.id,
                    "💀 could not connect; this worker will keep draining the queue and failing every flush: {:#}",
                    err
                );
                WorkerLink::Dedicated(None)
            }
        }
    }

    /// 📡 Ship the batch. Empty batch: no backend call at all. Failures are logged, never
    /// retried, and the batch is cleared either way.
    async fn flush_batch(&mut self, link: &mut WorkerLink) {
        if self.batch.is_empty() {
            return;
        }
        let docs = self.batch.len();
        let outcome = match link {
            WorkerLink::Dedicated(Some(connection)) => connection.bulk_write(&self.batch).await,
            WorkerLink::Dedicated(None) => Err(anyhow!(
                "💀 no connection; the connect at startup failed and nobody is coming to fix it"
            )),
            WorkerLink::Shared(connector) => {
                Self::flush_through(self.id, connector.as_ref(), &self.batch).await
            }
        };

        self.stats.record_flush(docs, outcome.is_ok());
        match outcome {
            Ok(()) => debug!(worker = self.id, docs, "🚀 batch flushed"),
            Err(err) => error!(
                worker = self.id,
                docs, "💀 flush failed, batch discarded: {:#}", err
            ),
        }
        self.batch.clear();
    }

    /// 🚇 Borrow a connection, write, give it back. The close happens whatever the write did.
    async fn flush_through(
        id: usize,
        connector: &dyn Connector,
        batch: &[WriteRequest],
    ) -> Result<()> {
        let mut connection = connector
            .connect()
            .await
            .context("💀 could not open a connection for this flush")?;
        let written = connection.bulk_write(batch).await;
        if let Err(err) = connection.close().await {
            warn!(worker = id, "⚠️ closing the per-flush connection failed: {:#}", err);
        }
        written
    }

    async fn stop(&mut self, link: WorkerLink) {
        if let WorkerLink::Dedicated(Some(mut connection)) = link {
            if let Err(err) = connection.close().await {
                warn!(
                    worker = self.id,
                    "⚠️ closing the dedicated connection failed: {:#}", err
                );
            }
        }
        if !self.batch.is_empty() {
            warn!(
                worker = self.id,
                unflushed = self.batch.len(),
                "🗑️ worker stopped with documents still in its batch; they were not sent"
            );
        }
        self.state = WorkerState::Stopped;
        info!(worker = self.id, "🏁 worker stopped");
    }
}
