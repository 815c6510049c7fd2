// ai
//! 🔄 Transforms — the enrichment assembly line every accepted record rides through.
//!
//! 🎬 COLD OPEN — INT. LOADING DOCK — 2:47 AM
//!
//! A record rolls in. Somebody wants a `team` field on it. Somebody else wants the
//! `password` field gone (who logged that?! who?!). A third somebody wants `msg` renamed
//! to `message` because the dashboard was built by a different team in a different era.
//! This module is all three somebodies.
//!
//! ## Knowledge Graph 🧠
//! - [`Transform`]: `apply(&mut Record) -> Result<()>`. Side effects on the record, errors
//!   are returned, never panicked.
//! - [`TransformChain`]: runs every transform in order. A failing link is logged and
//!   SKIPPED, the record keeps going (fail-open). The router owns that policy.
//! - Built-ins: [`AddFields`], [`RemoveFields`], [`RenameFields`] (enrichment) and
//!   [`DropRecord`], [`AssignIndex`] (routing decisions made from inside a chain).
//!
//! 🦆 The duck was transformed once. It is now a goose. It does not talk about it.

use std::fmt;

use anyhow::Result;
use tracing::warn;

use crate::record::Record;

pub(crate) mod enrich;
pub(crate) mod routing;

pub use enrich::{AddFields, RemoveFields, RenameFields};
pub use routing::{AssignIndex, DropRecord};

/// 🔄 One link in an enrichment chain.
pub trait Transform: fmt::Debug + Send + Sync {
    /// 🏷️ Short name for the logs, because "transform #3 failed" helps nobody at 3am.
    fn name(&self) -> &str;

    fn apply(&self, record: &mut Record) -> Result<()>;
}

/// ⛓️ An ordered list of transforms. Fail-open: one broken link never sinks the record.
#[derive(Debug, Default)]
pub struct TransformChain {
    links: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, link: impl Transform + 'static) -> Self {
        self.links.push(Box::new(link));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// 🚀 Run every link. Returns how many failed (they were already logged).
    ///
    /// Stops early only if a link marked the record DROP; enriching a corpse is wasted work.
    pub fn run(&self, record: &mut Record) -> usize {
        let mut failures = 0;
        for link in &self.links {
            if let Err(err) = link.apply(record) {
                failures += 1;
                warn!(
                    transform = link.name(),
                    "⚠️ transform failed, record continues without it: {:#}", err
                );
            }
            if record.is_dropped() {
                break;
            }
        }
        failures
    }
}
