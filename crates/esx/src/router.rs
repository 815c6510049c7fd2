// ai
//! 🚦 The Router — every record's job interview, in three rounds.
//!
//! ```text
//!   Record ──▶ 1. drop?  ──match──▶ DROP (stop. no index. no transform. no dispatch.)
//!                 │
//!                 ▼
//!              2. transform chain (fail-open: broken links are logged, record continues)
//!                 │
//!                 ▼
//!              3. dispatch switch (sees the enriched record; may drop or re-route)
//!                 │
//!                 ▼
//!              4. action? DROP → nothing.  ACCEPT → resolve destination, hand back.
//! ```
//!
//! Drop runs first so we never waste enrichment on a record that's headed for the bin.
//! Dispatch runs last so it can see what the transforms did.

use std::sync::Arc;

use tracing::trace;

use crate::condition::Predicate;
use crate::index_name::IndexTemplate;
use crate::record::{Action, Record};
use crate::transforms::TransformChain;

/// 🔀 One dispatch case: when `predicate` matches, run `actions`.
#[derive(Debug)]
pub struct DispatchCase {
    pub predicate: Box<dyn Predicate>,
    pub actions: TransformChain,
}

/// 🔀 Ordered dispatch cases. The first matching case runs; the rest are not consulted.
#[derive(Debug, Default)]
pub struct DispatchSwitch {
    cases: Vec<DispatchCase>,
}

impl DispatchSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case(mut self, predicate: impl Predicate + 'static, actions: TransformChain) -> Self {
        self.cases.push(DispatchCase {
            predicate: Box::new(predicate),
            actions,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// 🔀 Returns `true` if some case matched.
    pub fn dispatch(&self, record: &mut Record) -> bool {
        for (position, case) in self.cases.iter().enumerate() {
            if case.predicate.matches(record) {
                trace!(case = position, "🔀 dispatch case matched");
                case.actions.run(record);
                return true;
            }
        }
        false
    }
}

/// 🚦 The whole decision chain, frozen after construction and shared across callers.
#[derive(Debug)]
pub struct Router {
    drop: Vec<Box<dyn Predicate>>,
    pipe: Option<TransformChain>,
    switch: Option<DispatchSwitch>,
    index: IndexTemplate,
}

impl Router {
    /// 🏗️ A router that accepts everything and sends it to `index`.
    pub fn new(index: IndexTemplate) -> Self {
        Self {
            drop: Vec::new(),
            pipe: None,
            switch: None,
            index,
        }
    }

    pub fn drop_when(mut self, predicate: impl Predicate + 'static) -> Self {
        self.drop.push(Box::new(predicate));
        self
    }

    pub fn with_pipe(mut self, pipe: TransformChain) -> Self {
        self.pipe = (!pipe.is_empty()).then_some(pipe);
        self
    }

    pub fn with_switch(mut self, switch: DispatchSwitch) -> Self {
        self.switch = (!switch.is_empty()).then_some(switch);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 🗑️ Stage 1: any matching predicate drops the record.
    pub fn should_drop(&self, record: &Record) -> bool {
        self.drop.iter().any(|predicate| predicate.matches(record))
    }

    /// 🚦 Run all stages. On ACCEPT the record leaves with a destination.
    pub fn route(&self, record: &mut Record) -> Action {
        if self.should_drop(record) {
            record.drop_it();
            return Action::Drop;
        }

        if let Some(pipe) = &self.pipe {
            pipe.run(record);
        }

        if !record.is_dropped() {
            if let Some(switch) = &self.switch {
                switch.dispatch(record);
            }
        }

        if record.is_dropped() {
            return Action::Drop;
        }

        // -- a dispatch case may already have routed it somewhere more specific
        if record.destination.is_empty() {
            self.index.assign(record);
        }
        Action::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::record::normalize;
    use crate::transforms::{AddFields, AssignIndex, DropRecord, Transform};
    use anyhow::Result;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn static_index() -> IndexTemplate {
        IndexTemplate::constant("logs").unwrap()
    }

    #[derive(Debug, Default)]
    struct Snitch(Arc<AtomicUsize>);

    impl Transform for Snitch {
        fn name(&self) -> &str {
            "snitch"
        }

        fn apply(&self, _record: &mut Record) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn the_one_where_a_matching_drop_skips_everything_else() {
        let the_snitch_count = Arc::new(AtomicUsize::new(0));
        let the_router = Router::new(static_index())
            .drop_when(Condition::parse(&["host = x"]).unwrap())
            .with_pipe(TransformChain::new().with(Snitch(the_snitch_count.clone())));
        let mut the_record = normalize(br#"{"host":"x"}"#);

        assert_eq!(the_router.route(&mut the_record), Action::Drop);
        assert!(the_record.destination.is_empty(), "dropped records never get an index");
        assert_eq!(the_snitch_count.load(Ordering::SeqCst), 0, "no enrichment for the doomed");
    }

    #[test]
    fn the_one_where_any_predicate_is_enough() {
        let the_router = Router::new(static_index())
            .drop_when(Condition::parse(&["host = x"]).unwrap())
            .drop_when(Condition::parse(&["level = debug"]).unwrap());

        assert_eq!(the_router.route(&mut normalize(br#"{"level":"debug"}"#)), Action::Drop);
        assert_eq!(the_router.route(&mut normalize(br#"{"host":"x"}"#)), Action::Drop);

        let mut the_survivor = normalize(br#"{"host":"y","level":"info"}"#);
        assert_eq!(the_router.route(&mut the_survivor), Action::Accept);
        assert_eq!(the_survivor.destination, "logs");
    }

    #[test]
    fn the_one_where_dispatch_sees_what_the_transforms_did() {
        let the_router = Router::new(static_index())
            .with_pipe(TransformChain::new().with(AddFields::new([("tier", json!("gold"))])))
            .with_switch(DispatchSwitch::new().case(
                Condition::parse(&["tier = gold"]).unwrap(),
                TransformChain::new()
                    .with(AssignIndex::new(IndexTemplate::constant("vip").unwrap())),
            ));
        let mut the_record = normalize(b"{}");

        assert_eq!(the_router.route(&mut the_record), Action::Accept);
        assert_eq!(the_record.destination, "vip");
    }

    #[test]
    fn the_one_where_dispatch_drops_by_side_effect() {
        let the_router = Router::new(static_index()).with_switch(
            DispatchSwitch::new()
                .case(
                    Condition::parse(&["kind = noise"]).unwrap(),
                    TransformChain::new().with(DropRecord),
                )
                .case(
                    Condition::parse(&["kind = noise"]).unwrap(),
                    TransformChain::new().with(AddFields::new([("second", json!(true))])),
                ),
        );

        let mut the_noise = normalize(br#"{"kind":"noise"}"#);
        assert_eq!(the_router.route(&mut the_noise), Action::Drop);
        assert!(!the_noise.fields.contains_key("second"), "first match wins");

        let mut the_signal = normalize(br#"{"kind":"signal"}"#);
        assert_eq!(the_router.route(&mut the_signal), Action::Accept);
    }

    #[test]
    fn the_one_where_an_empty_router_accepts_everything() {
        let the_router = Router::new(static_index());
        let mut the_garbage = normalize(b"definitely not json");

        assert_eq!(the_router.route(&mut the_garbage), Action::Accept);
        assert_eq!(the_garbage.destination, "logs");
    }
}
