// ai
//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The monitoring dashboard glows amber in the dark. A worker holds a batch of ten
//! documents. It has held them for almost a second. The timer ticks. The worker exhales.
//! "`_bulk`," it whispers, and lets go.
//!
//! 🚀 This module sends batches into the elastic void: one NDJSON `_bulk` POST per flush,
//! with whatever auth, TLS, gzip, sniffing and health-checking the config asked for.
//! It does not retry. Retries are somebody else's philosophy.
//!
//! 🧠 Knowledge graph:
//! - [`ElasticsearchConfig`]: URLs, auth, TLS, timeouts, sniffing, health checks, gzip.
//! - [`ElasticsearchConnector`]: mints [`ElasticsearchConnection`]s. Two flavors:
//!   dedicated (the configured URLs, sniffing allowed) and tunnel (one fixed URL, no sniffing,
//!   because you can't sniff through a tunnel. we tried. it smelled like tunnel.)
//! - [`ElasticsearchConnection`]: round-robins bulk requests over the known nodes.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::transport::build_http_client;
use super::{Connection, Connector};
use crate::queue::WriteRequest;

// ============================================================
// 🔧 ElasticsearchConfig
// ============================================================

/// 🔧 Everything needed to talk to a cluster.
///
/// 🔒 Auth priority: `api_key` beats `auth_bearer_token` beats `username`/`password`.
/// This is not a democracy.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 One URL or a list. Scheme + host + port, all of it.
    #[serde(alias = "url", deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_bearer_token: Option<String>,
    #[serde(default)]
    pub tls_ca: Option<String>,
    #[serde(default)]
    pub tls_cert: Option<String>,
    #[serde(default)]
    pub tls_key: Option<String>,
    /// 🏚️ Legacy spellings. Used only when the matching `tls_*` key is unset.
    #[serde(default)]
    pub ssl_ca: Option<String>,
    #[serde(default)]
    pub ssl_cert: Option<String>,
    #[serde(default)]
    pub ssl_key: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub tls_min_version: Option<String>,
    /// 🚇 Route every request through this HTTP(S) proxy.
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub enable_sniffer: bool,
    /// 🩺 0 disables health checks entirely.
    #[serde(default)]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
    #[serde(default)]
    pub enable_gzip: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_health_check_timeout_secs() -> u64 {
    1
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

impl ElasticsearchConfig {
    /// 🧪 A config with one URL and every other knob at its default.
    pub fn for_url(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            password: None,
            api_key: None,
            auth_bearer_token: None,
            tls_ca: None,
            tls_cert: None,
            tls_key: None,
            ssl_ca: None,
            ssl_cert: None,
            ssl_key: None,
            insecure_skip_verify: false,
            tls_min_version: None,
            proxy: None,
            timeout_secs: default_timeout_secs(),
            enable_sniffer: false,
            health_check_interval_secs: 0,
            health_check_timeout_secs: default_health_check_timeout_secs(),
            enable_gzip: false,
        }
    }

    pub(crate) fn ca_path(&self) -> Option<&str> {
        self.tls_ca.as_deref().or(self.ssl_ca.as_deref())
    }

    pub(crate) fn cert_path(&self) -> Option<&str> {
        self.tls_cert.as_deref().or(self.ssl_cert.as_deref())
    }

    pub(crate) fn key_path(&self) -> Option<&str> {
        self.tls_key.as_deref().or(self.ssl_key.as_deref())
    }

    pub(crate) fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_check_interval_secs))
    }

    /// ✅ Catch bad URLs at setup, not 10,000 documents deep.
    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            bail!("💀 No Elasticsearch URLs configured. We need at least one place to send the bodies. The documents. We need somewhere to send the documents.");
        }
        for url in &self.urls {
            reqwest::Url::parse(url)
                .with_context(|| format!("💀 parsing URL '{}' failed", url))?;
        }
        if let Some(version) = self.tls_min_version.as_deref() {
            super::transport::parse_tls_version(version)?;
        }
        Ok(())
    }
}

// ============================================================
// 📡 ElasticsearchConnection
// ============================================================

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct NodesInfo {
    #[serde(default)]
    nodes: HashMap<String, NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    http: Option<NodeHttp>,
}

#[derive(Debug, Deserialize)]
struct NodeHttp {
    publish_address: String,
}

/// 📡 One live handle to a cluster (or to a tunnel pretending to be one).
#[derive(Debug)]
pub struct ElasticsearchConnection {
    client: reqwest::Client,
    config: Arc<ElasticsearchConfig>,
    nodes: Vec<String>,
    next_node: usize,
    last_health_check: Option<Instant>,
}

impl ElasticsearchConnection {
    /// 🚀 Build the client, then health-check and sniff if the config says so.
    ///
    /// A failed health check fails the connect. A failed sniff only warns and keeps the
    /// configured nodes; half a cluster map is worse than none.
    pub(crate) async fn open(
        config: Arc<ElasticsearchConfig>,
        nodes: Vec<String>,
        sniff: bool,
    ) -> Result<Self> {
        if nodes.is_empty() {
            bail!("💀 No nodes to connect to. The guest list is empty. The party is cancelled.");
        }
        let client = build_http_client(&config)?;
        let mut connection = Self {
            client,
            config,
            nodes,
            next_node: 0,
            last_health_check: None,
        };

        if connection.config.health_check_interval().is_some() {
            connection
                .health_check()
                .await
                .context("💀 initial health check failed; no node answered the door")?;
        }

        if sniff {
            match connection.sniff().await {
                Ok(found) if !found.is_empty() => {
                    debug!(nodes = ?found, "👃 sniffed cluster nodes");
                    connection.nodes = found;
                }
                Ok(_) => warn!("👃 sniffing found no HTTP nodes, keeping the configured URLs"),
                Err(err) => warn!("👃 sniffing failed, keeping the configured URLs: {:#}", err),
            }
        }

        Ok(connection)
    }

    /// 🎯 The node the next `_bulk` will hit. Looking does not move the cursor.
    fn peek_node(&self) -> String {
        self.nodes[self.next_node % self.nodes.len()].clone()
    }

    fn pick_node(&mut self) -> String {
        let node = self.peek_node();
        self.next_node = self.next_node.wrapping_add(1);
        node
    }

    fn endpoint(node: &str, path: &str) -> String {
        format!("{}/{}", node.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(api_key) = self.config.api_key.as_deref() {
            request.header(AUTHORIZATION, format!("ApiKey {}", api_key))
        } else if let Some(token) = self.config.auth_bearer_token.as_deref() {
            request.header(AUTHORIZATION, format!("Bearer {}", token))
        } else if let (Some(username), Some(password)) =
            (self.config.username.as_deref(), self.config.password.as_deref())
        {
            request.basic_auth(username, Some(password))
        } else {
            request
        }
    }

    /// 🩺 Ping the node root. Any 2xx counts as alive.
    async fn health_check(&mut self) -> Result<()> {
        let node = self.peek_node();
        let timeout = Duration::from_secs(self.config.health_check_timeout_secs.max(1));
        let response = self
            .authorize(self.client.get(Self::endpoint(&node, "")))
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("💀 health check to '{}' got ghosted", node))?;
        let status = response.status();
        self.last_health_check = Some(Instant::now());
        if !status.is_success() {
            bail!("💀 health check to '{}' answered {}", node, status);
        }
        trace!(node = %node, "🩺 node is alive");
        Ok(())
    }

    /// 👃 Ask the cluster who's in it.
    async fn sniff(&mut self) -> Result<Vec<String>> {
        let node = self.nodes[0].clone();
        let scheme = reqwest::Url::parse(&node)
            .map(|url| url.scheme().to_string())
            .unwrap_or_else(|_| "http".to_string());
        let response = self
            .authorize(self.client.get(Self::endpoint(&node, "_nodes/http")))
            .send()
            .await
            .context("💀 sniff request never made it")?;
        let status = response.status();
        if !status.is_success() {
            bail!("💀 sniff answered {}", status);
        }
        let bytes = response.bytes().await.context("💀 sniff response vanished mid-read")?;
        let info: NodesInfo = serde_json::from_slice(&bytes)
            .context("💀 sniff response was not the JSON we were promised")?;

        let mut found: Vec<String> = info
            .nodes
            .into_values()
            .filter_map(|node| node.http)
            .map(|http| {
                // -- ES likes "hostname/1.2.3.4:9200". We like the part after the slash.
                let address = http
                    .publish_address
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                format!("{}://{}", scheme, address)
            })
            .collect();
        found.sort();
        Ok(found)
    }

    fn render_bulk_body(batch: &[WriteRequest]) -> Result<String> {
        let estimated_size = batch.len() * 256;
        let mut body = String::with_capacity(estimated_size);
        for request in batch {
            request
                .write_bulk_lines(&mut body)
                .context("💀 a document refused to become NDJSON. The JSON that describes JSON has failed to become JSON.")?;
        }
        Ok(body)
    }

    fn gzip(body: &[u8]) -> Result<Vec<u8>> {
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
        encoder.write_all(body).context("💀 gzip choked on the payload")?;
        encoder.finish().context("💀 gzip could not finish. It had so much left to say.")
    }
}

#[async_trait]
impl Connection for ElasticsearchConnection {
    /// 📡 One POST to `/_bulk`. Non-2xx is an error; a 2xx with `"errors": true` is a warning.
    async fn bulk_write(&mut self, batch: &[WriteRequest]) -> Result<()> {
        if let Some(interval) = self.config.health_check_interval() {
            let due = self
                .last_health_check
                .is_none_or(|last| last.elapsed() >= interval);
            if due {
                if let Err(err) = self.health_check().await {
                    warn!("🩺 periodic health check failed, sending anyway: {:#}", err);
                }
            }
        }

        let body = Self::render_bulk_body(batch)?;
        let node = self.pick_node();
        let bulk_url = Self::endpoint(&node, "_bulk");
        let mut request = self
            .client
            .post(&bulk_url)
            .header(CONTENT_TYPE, "application/x-ndjson");

        let body_len = body.len();
        request = if self.config.enable_gzip {
            request
                .header(CONTENT_ENCODING, "gzip")
                .body(Self::gzip(body.as_bytes())?)
        } else {
            request.body(body)
        };
        request = self.authorize(request);

        debug!(docs = batch.len(), bytes = body_len, node = %node, "📡 sending bulk request");
        let response = request.send().await.with_context(|| {
            format!(
                "💀 The bulk request to '{}' never made it. The network responded with what can only be described as 'not vibing with it.'",
                bulk_url
            )
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!(
                "💀 The bulk request arrived, but Elasticsearch looked at our documents and said '{}'. The body of the response read: '{}'.",
                status,
                text
            );
        }

        if let Ok(summary) = serde_json::from_str::<BulkResponse>(&text) {
            if summary.errors {
                let rejected = summary
                    .items
                    .iter()
                    .filter(|item| item.values().any(|result| result.get("error").is_some()))
                    .count();
                warn!(
                    docs = batch.len(),
                    rejected, "⚠️ bulk request landed but some documents were rejected"
                );
            }
        }

        trace!("🚀 bulk request landed, documents have left the building Elvis-style");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        debug!(nodes = self.nodes.len(), "🗑️ elasticsearch connection closing");
        Ok(())
    }
}

// ============================================================
// 🏭 ElasticsearchConnector
// ============================================================

/// 🏭 Mints [`ElasticsearchConnection`]s.
#[derive(Debug, Clone)]
pub struct ElasticsearchConnector {
    config: Arc<ElasticsearchConfig>,
    nodes: Vec<String>,
    sniff: bool,
}

impl ElasticsearchConnector {
    /// 🔒 Dedicated flavor: configured URLs, sniffing if enabled.
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self {
            nodes: config.urls.clone(),
            sniff: config.enable_sniffer,
            config: Arc::new(config),
        }
    }

    /// 🚇 Tunnel flavor: every connection goes through `tunnel_url` (or the configured
    /// URLs when none is given). Never sniffs.
    pub fn tunnel(config: ElasticsearchConfig, tunnel_url: Option<String>) -> Self {
        let nodes = match tunnel_url {
            Some(url) => vec![url],
            None => config.urls.clone(),
        };
        Self {
            nodes,
            sniff: false,
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Connector for ElasticsearchConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let connection =
            ElasticsearchConnection::open(self.config.clone(), self.nodes.clone(), self.sniff)
                .await?;
        Ok(Box::new(connection))
    }
}
