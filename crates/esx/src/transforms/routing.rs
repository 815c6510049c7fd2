//! 🧭 Routing transforms — decisions that live inside a chain or a dispatch case.
//!
//! [`AssignIndex`] is the boundary adapter that lets an [`IndexTemplate`] ride along in a
//! transform chain. Same resolver, same contract, just wearing the `Transform` costume.

use anyhow::Result;

use super::Transform;
use crate::index_name::IndexTemplate;
use crate::record::Record;

/// 🗑️ Mark the record DROP. No write will ever be produced for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropRecord;

impl Transform for DropRecord {
    fn name(&self) -> &str {
        "drop"
    }

    fn apply(&self, record: &mut Record) -> Result<()> {
        record.drop_it();
        Ok(())
    }
}

/// 📡 Stamp a destination on the record using its own template.
#[derive(Debug, Clone)]
pub struct AssignIndex {
    template: IndexTemplate,
}

impl AssignIndex {
    pub fn new(template: IndexTemplate) -> Self {
        Self { template }
    }
}

impl Transform for AssignIndex {
    fn name(&self) -> &str {
        "assign_index"
    }

    fn apply(&self, record: &mut Record) -> Result<()> {
        self.template.assign(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::normalize;

    #[test]
    fn the_one_where_assign_index_wears_the_resolver_costume() {
        let the_link = AssignIndex::new(IndexTemplate::compile("%s-errors", &["$app"]).unwrap());
        let mut the_record = normalize(br#"{"app":"billing"}"#);

        the_link.apply(&mut the_record).unwrap();
        assert_eq!(the_record.destination, "billing-errors");
    }
}
