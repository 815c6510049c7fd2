//! # Previously, on ESX...
//!
//! 🎬 The cluster was down. Or it was never up. Or it was 3am and nobody wanted to start
//! Docker. Someone had to pretend to be Elasticsearch. Someone had to be brave.
//!
//! That someone was this module.
//!
//! [`InMemoryBackend`] is a [`Connector`] whose connections hoard every batch in a shared
//! `Vec` behind an `Arc<Mutex<...>>`, so tests can inspect what arrived. It also counts
//! connects and closes, and can be told to fail on purpose, because tests need villains.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also deploy
//! a therapist.
//!
//! 🦆

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use super::{Connection, Connector};
use crate::queue::WriteRequest;

#[derive(Debug, Default)]
struct Vault {
    /// 🔒 The evidence locker. One entry per successful bulk write, in arrival order.
    batches: Mutex<Vec<Vec<WriteRequest>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    bulk_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
}

/// 📦 A backend that never forgets. Clone it, hand one copy to the pipeline, keep one for
/// assertions. The `Arc` means everyone shares the same vault.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    vault: Arc<Vault>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 Make every future `connect` fail. For testing how workers cope with rejection.
    pub fn fail_connects(&self, fail: bool) {
        self.vault.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// 💀 Make every future `bulk_write` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.vault.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 📦 Every batch that landed, in arrival order.
    pub async fn batches(&self) -> Vec<Vec<WriteRequest>> {
        self.vault.batches.lock().await.clone()
    }

    /// 📦 Every document that landed, flattened.
    pub async fn documents(&self) -> Vec<WriteRequest> {
        self.vault
            .batches
            .lock()
            .await
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.vault.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.vault.closes.load(Ordering::SeqCst)
    }

    /// 📡 Bulk calls attempted, including the ones told to fail.
    pub fn bulk_calls(&self) -> usize {
        self.vault.bulk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for InMemoryBackend {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        if self.vault.fail_connect.load(Ordering::SeqCst) {
            bail!("💀 in-memory backend was told to refuse connections, and it is nothing if not obedient");
        }
        self.vault.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryConnection {
            vault: self.vault.clone(),
        }))
    }
}

/// 🧪 One connection into the vault.
#[derive(Debug)]
pub struct InMemoryConnection {
    vault: Arc<Vault>,
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn bulk_write(&mut self, batch: &[WriteRequest]) -> Result<()> {
        self.vault.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.vault.fail_writes.load(Ordering::SeqCst) {
            bail!("💀 in-memory backend was told to drop the ball, so it dropped the ball");
        }
        trace!(docs = batch.len(), "🧪 batch stored in RAM");
        // 🔒 The Mutex is load-bearing. I know it looks optional. It isn't.
        self.vault.batches.lock().await.push(batch.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.vault.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn the_one_where_the_vault_remembers_every_batch() {
        let the_backend = InMemoryBackend::new();
        let mut the_connection = the_backend.connect().await.unwrap();

        the_connection
            .bulk_write(&[WriteRequest::new("a", Map::new())])
            .await
            .unwrap();
        the_connection
            .bulk_write(&[WriteRequest::new("b", Map::new()), WriteRequest::new("c", Map::new())])
            .await
            .unwrap();
        the_connection.close().await.unwrap();

        let the_batches = the_backend.batches().await;
        assert_eq!(the_batches.len(), 2);
        assert_eq!(the_batches[1][1].index, "c");
        assert_eq!(the_backend.documents().await.len(), 3);
        assert_eq!((the_backend.connects(), the_backend.closes()), (1, 1));
    }

    #[tokio::test]
    async fn the_one_where_the_villains_get_their_scene() {
        let the_backend = InMemoryBackend::new();
        the_backend.fail_connects(true);
        assert!(the_backend.connect().await.is_err());
        assert_eq!(the_backend.connects(), 0);

        the_backend.fail_connects(false);
        the_backend.fail_writes(true);
        let mut the_connection = the_backend.connect().await.unwrap();
        assert!(the_connection.bulk_write(&[WriteRequest::new("a", Map::new())]).await.is_err());
        assert_eq!(the_backend.bulk_calls(), 1);
        assert!(the_backend.batches().await.is_empty());
    }
}
