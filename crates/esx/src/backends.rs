//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Workers fill batches, backends slurp them up in one `_bulk` gulp.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - [`Connection`]: one live handle that can bulk-write a batch. Owned by exactly one worker
//!   (dedicated mode) or borrowed for exactly one flush (shared/tunnel mode).
//! - [`Connector`]: mints connections. Dedicated workers call it once at startup; shared-mode
//!   workers call it on every flush and close what they got, success or failure.
//! - [`BackendConfig`]: the config-side casting call. Elasticsearch for real life,
//!   InMemory for tests and dry runs.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::queue::WriteRequest;

pub(crate) mod elasticsearch;
pub(crate) mod in_mem;
pub(crate) mod transport;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchConnection, ElasticsearchConnector};
pub use in_mem::{InMemoryBackend, InMemoryConnection};

/// 📡 A live backend handle.
///
/// # Contract
/// - `bulk_write` submits the whole batch as ONE bulk request, in order. Non-empty batches only;
///   callers skip the call entirely when there's nothing to send.
/// - `close` releases whatever the connection holds. Called exactly once by the owner.
#[async_trait]
pub trait Connection: std::fmt::Debug + Send {
    async fn bulk_write(&mut self, batch: &[WriteRequest]) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🏭 A factory of [`Connection`]s. Shared across workers, so it must be `Sync`.
#[async_trait]
pub trait Connector: std::fmt::Debug + Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// 🎭 Which backend the pipeline writes to.
#[derive(Debug, Deserialize, Clone)]
pub enum BackendConfig {
    Elasticsearch(ElasticsearchConfig),
    /// 🧪 Keeps every batch in RAM. For tests, dry runs, and trust issues.
    InMemory,
}

/// 🔀 Delivery strategy, chosen once.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub enum DeliveryConfig {
    /// 🔒 Every worker opens its own long-lived connection.
    #[default]
    Dedicated,
    /// 🚇 Every flush borrows a short-lived connection through a shared tunnel endpoint.
    Shared {
        /// 📡 The tunnel's base URL. Bulk requests go to `{tunnel_url}/_bulk`.
        /// When absent, the backend's own URLs are used.
        #[serde(default)]
        tunnel_url: Option<String>,
    },
}

impl BackendConfig {
    /// 🏭 Build the connector for `delivery`.
    ///
    /// For the in-memory backend both modes share the same store, so tests can
    /// inspect what arrived no matter how it got there.
    pub fn connector(&self, delivery: &DeliveryConfig) -> Arc<dyn Connector> {
        match (self, delivery) {
            (BackendConfig::Elasticsearch(config), DeliveryConfig::Dedicated) => {
                Arc::new(ElasticsearchConnector::new(config.clone()))
            }
            (BackendConfig::Elasticsearch(config), DeliveryConfig::Shared { tunnel_url }) => {
                Arc::new(ElasticsearchConnector::tunnel(config.clone(), tunnel_url.clone()))
            }
            (BackendConfig::InMemory, _) => Arc::new(InMemoryBackend::new()),
        }
    }
}
