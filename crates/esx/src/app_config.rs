//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! ```toml
//! drop = [["host = noisy-box"], ["level = debug", "env != prod"]]
//!
//! [runtime]
//! workers = 4
//! flush_threshold = 500
//! flush_interval_secs = 2
//!
//! [index]
//! template = "logs-%s-%s"
//! fields = ["$service", "$day"]
//!
//! [transform]
//! add_fields = { pipeline = "esx" }
//! remove_fields = ["password"]
//! rename_fields = { msg = "message" }
//!
//! [[dispatch]]
//! when = ["level = audit"]
//! index = "audit-%s"
//! fields = ["$month"]
//!
//! [backend.Elasticsearch]
//! urls = ["https://es-1:9200", "https://es-2:9200"]
//! api_key = "..."
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::backends::{BackendConfig, Connector, DeliveryConfig};
use crate::client::{IngestionPolicy, MIN_WORKERS};
use crate::condition::Condition;
use crate::index_name::IndexTemplate;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::router::{DispatchSwitch, Router};
use crate::transforms::{
    AddFields, AssignIndex, DropRecord, RemoveFields, RenameFields, TransformChain,
};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub index: IndexConfig,
    /// 🗑️ Each inner list is one predicate (its comparisons ANDed). Any match drops.
    #[serde(default)]
    pub drop: Vec<Vec<String>>,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub dispatch: Vec<DispatchConfig>,
    pub backend: BackendConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// ⚙️ Pool and batching knobs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers", alias = "num_workers")]
    pub workers: usize,
    #[serde(default = "default_flush_threshold", alias = "batch_size")]
    pub flush_threshold: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    MIN_WORKERS
}

fn default_flush_threshold() -> usize {
    10
}

fn default_flush_interval_secs() -> u64 {
    1
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            flush_threshold: default_flush_threshold(),
            flush_interval_secs: default_flush_interval_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 🏷️ Destination template plus its field references.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub template: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// 🧪 Static enrichment applied to every surviving record, in this order: add, rename, remove.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TransformConfig {
    #[serde(default)]
    pub add_fields: Map<String, Value>,
    #[serde(default)]
    pub rename_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub remove_fields: Vec<String>,
}

/// 🔀 One dispatch case. `drop = true` wins over any routing in the same case.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    pub when: Vec<String>,
    #[serde(default)]
    pub drop: bool,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub add_fields: Map<String, Value>,
}

impl TransformConfig {
    fn chain(&self) -> TransformChain {
        let mut chain = TransformChain::new();
        if !self.add_fields.is_empty() {
            chain = chain.with(AddFields::new(self.add_fields.clone()));
        }
        if !self.rename_fields.is_empty() {
            chain = chain.with(RenameFields::new(self.rename_fields.clone()));
        }
        if !self.remove_fields.is_empty() {
            chain = chain.with(RemoveFields::new(self.remove_fields.clone()));
        }
        chain
    }
}

impl DispatchConfig {
    fn actions(&self) -> Result<TransformChain> {
        if self.drop {
            return Ok(TransformChain::new().with(DropRecord));
        }
        let mut actions = TransformChain::new();
        if !self.add_fields.is_empty() {
            actions = actions.with(AddFields::new(self.add_fields.clone()));
        }
        if let Some(template) = self.index.as_deref() {
            let template = IndexTemplate::compile(template, self.fields.as_slice())?;
            actions = actions.with(AssignIndex::new(template));
        }
        Ok(actions)
    }
}

impl AppConfig {
    /// 🔧 The runtime knobs, checked and frozen.
    pub fn policy(&self) -> Result<IngestionPolicy> {
        let policy = IngestionPolicy {
            workers: self.runtime.workers,
            flush_threshold: self.runtime.flush_threshold,
            flush_interval: Duration::from_secs(self.runtime.flush_interval_secs),
            queue_capacity: self.runtime.queue_capacity,
            delivery: self.delivery.clone(),
        };
        policy
            .validate()
            .context("💀 the [runtime] section does not hold up")?;
        Ok(policy)
    }

    /// 🚦 Compile every template and condition. Any bad one fails here, at setup.
    pub fn router(&self) -> Result<Router> {
        let index = IndexTemplate::compile(&self.index.template, self.index.fields.as_slice())
            .context("💀 the [index] section does not compile")?;
        let mut router = Router::new(index);

        for (position, exprs) in self.drop.iter().enumerate() {
            let condition = Condition::parse(exprs.as_slice())
                .with_context(|| format!("💀 drop predicate #{} does not parse", position))?;
            router = router.drop_when(condition);
        }

        router = router.with_pipe(self.transform.chain());

        let mut switch = DispatchSwitch::new();
        for (position, case) in self.dispatch.iter().enumerate() {
            let when = Condition::parse(case.when.as_slice()).with_context(|| {
                format!("💀 dispatch case #{} has an unparseable `when`", position)
            })?;
            let actions = case
                .actions()
                .with_context(|| format!("💀 dispatch case #{} has broken actions", position))?;
            switch = switch.case(when, actions);
        }
        Ok(router.with_switch(switch))
    }

    /// 🏭 The connector for the configured backend and delivery mode.
    pub fn connector(&self) -> Result<Arc<dyn Connector>> {
        if let BackendConfig::Elasticsearch(config) = &self.backend {
            config.validate().context("💀 the [backend] section is not usable")?;
        }
        if let DeliveryConfig::Shared {
            tunnel_url: Some(url),
        } = &self.delivery
        {
            reqwest::Url::parse(url)
                .with_context(|| format!("💀 tunnel URL '{}' did not parse", url))?;
        }
        Ok(self.backend.connector(&self.delivery))
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`ESX_*`, `__` for nesting, e.g.
/// `ESX_RUNTIME__WORKERS=8`) with an optional TOML file. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("ESX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
