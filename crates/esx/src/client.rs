// ai
//! 🎬 *[INT. COORDINATOR'S OFFICE — NIGHT]*
//! *[a single desk lamp. one queue. a handful of workers. a router that never sleeps.]*
//!
//! 🚀 The [`IngestClient`] is the front door: every raw line goes through
//! normalize → route → enqueue, and the workers behind the queue take it from there.
//!
//! 🧠 Knowledge graph:
//! - [`IngestionPolicy`]: the runtime knobs, frozen at construction.
//! - `start` spawns the worker pool (never fewer than [`MIN_WORKERS`]).
//! - `write` never fails on a DROP; it only fails when the queue is closed
//!   ([`QueueClosed`], downcastable) or the client was never started.
//! - `close` broadcasts shutdown and closes the queue. Calling it twice is a shrug.
//! - `join` waits for every worker to reach Stopped.
//!
//! 🦆 The duck is the coordinator's emotional support animal. Please do not pet it during shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, bail};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backends::{Connector, DeliveryConfig};
use crate::queue::{DEFAULT_QUEUE_CAPACITY, DispatchQueue, QueueClosed, WriteRequest};
use crate::record::{Action, normalize};
use crate::router::Router;
use crate::stats::{Stats, StatsSnapshot};
use crate::worker::{FlushPolicy, Worker};

/// 👷 The pool never goes below this, no matter what the config says.
pub const MIN_WORKERS: usize = 3;

/// 🔧 Runtime knobs. Immutable once the client has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionPolicy {
    pub workers: usize,
    pub flush_threshold: usize,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub delivery: DeliveryConfig,
}

impl Default for IngestionPolicy {
    fn default() -> Self {
        Self {
            workers: MIN_WORKERS,
            flush_threshold: 10,
            flush_interval: Duration::from_secs(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery: DeliveryConfig::Dedicated,
        }
    }
}

impl IngestionPolicy {
    /// 👷 Configured worker count with the floor applied.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(MIN_WORKERS)
    }

    /// 🚧 Refuse the knobs that would turn a worker into a space heater.
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            bail!(
                "💀 flush_interval must be at least one tick long. A zero-length timer is just a very hot loop."
            );
        }
        if self.flush_threshold == 0 {
            bail!("💀 flush_threshold must be at least 1. A batch of nothing is not a batch.");
        }
        Ok(())
    }
}

/// 🚪 The coordinator. Share it behind an `Arc` if several producers write at once.
#[derive(Debug)]
pub struct IngestClient {
    policy: IngestionPolicy,
    router: Arc<Router>,
    connector: Arc<dyn Connector>,
    queue: DispatchQueue,
    shutdown: CancellationToken,
    stats: Arc<Stats>,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestClient {
    /// 🏗️ Fails if the policy would make the workers busy-poll or never flush.
    pub fn new(
        policy: IngestionPolicy,
        router: Arc<Router>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        policy.validate()?;
        let queue = DispatchQueue::bounded(policy.queue_capacity);
        Ok(Self {
            policy,
            router,
            connector,
            queue,
            shutdown: CancellationToken::new(),
            stats: Arc::new(Stats::default()),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn policy(&self) -> &IngestionPolicy {
        &self.policy
    }

    fn worker_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        // -- a poisoned lock only means some other caller panicked mid-push; the Vec is still fine
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 🚀 Spawn the worker pool. A second call is logged and ignored.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("⚠️ ingest client already started; not spawning a second pool");
            return;
        }
        if self.queue.is_closed() {
            warn!("⚠️ ingest client was closed before it ever started; nothing to spawn");
            return;
        }

        let count = self.policy.effective_workers();
        let flush = FlushPolicy {
            threshold: self.policy.flush_threshold,
            interval: self.policy.flush_interval,
        };
        let mut handles = self.worker_handles();
        for id in 0..count {
            let worker = Worker::new(
                id,
                self.queue.consumer(),
                self.connector.clone(),
                &self.policy.delivery,
                flush,
                self.shutdown.clone(),
                self.stats.clone(),
            );
            handles.push(worker.start());
        }
        info!(
            workers = count,
            flush_threshold = flush.threshold,
            flush_interval_ms = flush.interval.as_millis() as u64,
            queue_capacity = self.queue.capacity(),
            "🚀 ingest client started"
        );
    }

    /// 📬 Normalize, route, and (if accepted) enqueue one raw record.
    ///
    /// Waits when the queue is full. A dropped record is `Ok(())`.
    pub async fn write(&self, raw: &[u8]) -> Result<()> {
        if self.queue.is_closed() {
            return Err(QueueClosed.into());
        }
        if !self.started.load(Ordering::SeqCst) {
            bail!("💀 ingest client was written to before start(); the workers are still in the parking lot");
        }

        self.stats.record_write();
        let mut record = normalize(raw);
        if self.router.route(&mut record) == Action::Drop {
            trace!("🗑️ record dropped by routing");
            self.stats.record_drop();
            return Ok(());
        }

        let request = WriteRequest::new(record.destination, record.fields);
        self.queue.enqueue(request).await?;
        self.stats.record_enqueue();
        Ok(())
    }

    /// 🛑 Broadcast shutdown and close the queue. A second call is logged and ignored.
    pub fn close(&self) -> Result<()> {
        // -- workers hear the shutdown before they see the queue go quiet
        self.shutdown.cancel();
        if !self.queue.close() {
            debug!("🔒 ingest client already closed");
            return Ok(());
        }
        let abandoned = self.queue.len();
        if abandoned > 0 {
            warn!(abandoned, "🗑️ closing with requests still queued; they will not be sent");
        }
        info!("🛑 ingest client closed");
        Ok(())
    }

    /// ⏳ Wait for every worker to stop. Call after [`close`](Self::close).
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.worker_handles().drain(..).collect();
        for outcome in join_all(handles).await {
            if let Err(err) = outcome {
                warn!("⚠️ a worker task ended abnormally: {}", err);
            }
        }
    }

    /// ⏳ Wait until every enqueued document has been through a flush attempt.
    ///
    /// Returns early if the client shuts down or every worker has already exited.
    pub async fn wait_idle(&self) {
        loop {
            if self.stats.snapshot().unflushed() == 0 {
                return;
            }
            let all_gone = self.worker_handles().iter().all(|h| h.is_finished());
            if self.shutdown.is_cancelled() || all_gone {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_handles().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryBackend;
    use crate::condition::Condition;
    use crate::index_name::IndexTemplate;

    fn client_with(
        router: Router,
        backend: &InMemoryBackend,
        policy: IngestionPolicy,
    ) -> IngestClient {
        IngestClient::new(policy, router.into_shared(), Arc::new(backend.clone())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_host_x_never_reaches_the_queue() {
        let the_backend = InMemoryBackend::new();
        let the_router = Router::new(IndexTemplate::constant("logs").unwrap())
            .drop_when(Condition::parse(&["host = x"]).unwrap());
        let the_client = client_with(the_router, &the_backend, IngestionPolicy::default());
        the_client.start();

        the_client.write(br#"{"host":"x"}"#).await.unwrap();

        assert_eq!(the_client.queued(), 0);
        let the_stats = the_client.stats();
        assert_eq!((the_stats.written, the_stats.dropped, the_stats.enqueued), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_writes_land_routed_and_batched() {
        let the_backend = InMemoryBackend::new();
        let the_router =
            Router::new(IndexTemplate::compile("app-%s", &["$service"]).unwrap());
        let the_client = client_with(the_router, &the_backend, IngestionPolicy::default());
        the_client.start();

        for n in 0..25 {
            let the_line = format!(r#"{{"service":"billing","n":{}}}"#, n);
            the_client.write(the_line.as_bytes()).await.unwrap();
        }
        the_client.wait_idle().await;

        let the_documents = the_backend.documents().await;
        assert_eq!(the_documents.len(), 25);
        assert!(the_documents.iter().all(|r| r.index == "app-billing"));
        assert!(the_documents.iter().all(|r| r.doc.contains_key("@timestamp")));
        assert_eq!(the_client.stats().delivered, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_pool_has_a_floor_and_start_is_idempotent() {
        let the_backend = InMemoryBackend::new();
        let the_policy = IngestionPolicy {
            workers: 1,
            ..IngestionPolicy::default()
        };
        let the_client = client_with(
            Router::new(IndexTemplate::constant("logs").unwrap()),
            &the_backend,
            the_policy,
        );

        the_client.start();
        the_client.start();
        assert_eq!(the_client.worker_count(), MIN_WORKERS);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(the_backend.connects(), MIN_WORKERS, "one dedicated connection per worker");
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_writing_after_close_is_loud() {
        let the_backend = InMemoryBackend::new();
        let the_client = client_with(
            Router::new(IndexTemplate::constant("logs").unwrap()),
            &the_backend,
            IngestionPolicy::default(),
        );
        the_client.start();
        the_client.close().unwrap();
        assert!(the_client.shutdown.is_cancelled(), "close broadcasts the shutdown");
        the_client.close().unwrap();

        let the_error = the_client.write(b"{}").await.unwrap_err();
        assert!(the_error.downcast_ref::<QueueClosed>().is_some());

        the_client.join().await;
        assert_eq!(the_backend.closes(), MIN_WORKERS);
    }

    #[test]
    fn the_one_where_a_zero_interval_or_threshold_never_gets_a_client() {
        let the_router = Router::new(IndexTemplate::constant("logs").unwrap()).into_shared();
        let the_connector: Arc<dyn Connector> = Arc::new(InMemoryBackend::new());

        let the_frozen_clock = IngestionPolicy {
            flush_interval: Duration::ZERO,
            ..IngestionPolicy::default()
        };
        let the_empty_batch = IngestionPolicy {
            flush_threshold: 0,
            ..IngestionPolicy::default()
        };

        let the_clock_refusal =
            IngestClient::new(the_frozen_clock, the_router.clone(), the_connector.clone());
        assert!(the_clock_refusal.is_err());
        assert!(IngestClient::new(the_empty_batch, the_router, the_connector).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_close_cancels_before_it_locks_the_door() {
        let the_client = client_with(
            Router::new(IndexTemplate::constant("logs").unwrap()),
            &InMemoryBackend::new(),
            IngestionPolicy::default(),
        );
        the_client.start();
        let the_shutdown = the_client.shutdown.clone();
        let the_consumer = the_client.queue.consumer();

        the_client.close().unwrap();

        assert!(the_shutdown.is_cancelled());
        assert!(the_consumer.is_closed());
        the_client.join().await;
    }

    #[tokio::test]
    async fn the_one_where_writing_before_start_is_refused() {
        let the_client = client_with(
            Router::new(IndexTemplate::constant("logs").unwrap()),
            &InMemoryBackend::new(),
            IngestionPolicy::default(),
        );
        assert!(the_client.write(b"{}").await.is_err());
        assert_eq!(the_client.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_garbage_still_gets_indexed_as_an_error_record() {
        let the_backend = InMemoryBackend::new();
        let the_client = client_with(
            Router::new(IndexTemplate::constant("logs").unwrap()),
            &the_backend,
            IngestionPolicy::default(),
        );
        the_client.start();

        the_client.write(b"this is not json").await.unwrap();
        the_client.wait_idle().await;

        let the_documents = the_backend.documents().await;
        assert_eq!(the_documents.len(), 1);
        assert_eq!(the_documents[0].doc["message"], "this is not json");
        assert!(the_documents[0].doc.contains_key("@error"));
    }
}
