//! 🚰 esx — batched bulk ingestion into Elasticsearch-style backends.
//!
//! ```text
//!   raw bytes ─▶ normalize ─▶ route (drop → transform → dispatch) ─▶ resolve index
//!        ─▶ bounded queue ─▶ N workers ─▶ batch ─▶ one `_bulk` POST on size or timer
//! ```
//!
//! 🦆 Every crate gets a duck. This one is load-bearing.

pub mod app_config;
pub mod backends;
pub mod client;
pub mod condition;
pub mod feeder;
pub mod index_name;
pub mod queue;
pub mod record;
pub mod router;
pub mod stats;
pub mod transforms;
pub mod worker;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tracing::info;

use crate::app_config::AppConfig;
use crate::client::IngestClient;
use crate::stats::StatsSnapshot;

/// 🚀 Build the pipeline from config, feed it `input` until EOF, let the last batches
/// land, then shut down. Returns the final counters.
pub async fn run<R: AsyncRead + Unpin>(app_config: AppConfig, input: R) -> Result<StatsSnapshot> {
    let router = app_config
        .router()
        .context("💀 could not build the routing pipeline from config")?
        .into_shared();
    let connector = app_config
        .connector()
        .context("💀 could not build the backend connector from config")?;

    let policy = app_config
        .policy()
        .context("💀 could not build the ingestion policy from config")?;
    let client = IngestClient::new(policy, router, connector)?;
    client.start();

    let fed = feeder::feed(&client, input).await;
    // -- no final flush on close, so give the timers a chance first
    client.wait_idle().await;
    client.close()?;
    client.join().await;

    let lines = fed.context("💀 feeding the pipeline failed partway through")?;
    let stats = client.stats();
    info!(
        lines,
        delivered = stats.delivered,
        failed = stats.failed_docs,
        "🏁 ingestion finished"
    );
    Ok(stats)
}
