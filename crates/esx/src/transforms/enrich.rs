//! 🧂 Enrichment transforms — season the record to taste.

use anyhow::{Result, bail};
use serde_json::{Map, Value};

use super::Transform;
use crate::record::{Record, TIMESTAMP_FIELD};

/// ➕ Insert static fields. Existing keys are overwritten, because config is the boss.
#[derive(Debug, Clone, Default)]
pub struct AddFields {
    fields: Map<String, Value>,
}

impl AddFields {
    pub fn new<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Transform for AddFields {
    fn name(&self) -> &str {
        "add_fields"
    }

    fn apply(&self, record: &mut Record) -> Result<()> {
        for (key, value) in &self.fields {
            record.fields.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// ➖ Remove fields. `@timestamp` is not negotiable and refuses to leave.
#[derive(Debug, Clone, Default)]
pub struct RemoveFields {
    keys: Vec<String>,
}

impl RemoveFields {
    pub fn new<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transform for RemoveFields {
    fn name(&self) -> &str {
        "remove_fields"
    }

    fn apply(&self, record: &mut Record) -> Result<()> {
        for key in &self.keys {
            if key == TIMESTAMP_FIELD {
                bail!("💀 Refusing to remove '{}'. Every record keeps its timestamp. Every. Single. One.", key);
            }
            // -- shift_remove keeps the remaining keys in their original order
            record.fields.shift_remove(key);
        }
        Ok(())
    }
}

/// 🏷️ Rename fields. Missing sources are skipped silently; a rename onto an existing key fails.
#[derive(Debug, Clone, Default)]
pub struct RenameFields {
    pairs: Vec<(String, String)>,
}

impl RenameFields {
    pub fn new<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Transform for RenameFields {
    fn name(&self) -> &str {
        "rename_fields"
    }

    fn apply(&self, record: &mut Record) -> Result<()> {
        for (from, to) in &self.pairs {
            if from == TIMESTAMP_FIELD {
                bail!(
                    "💀 Refusing to rename '{}' to '{}'. The timestamp keeps its name. It has had it since birth.",
                    from,
                    to
                );
            }
            if from == to || !record.fields.contains_key(from) {
                continue;
            }
            if record.fields.contains_key(to) {
                bail!(
                    "💀 Can't rename '{}' to '{}': '{}' already lives there and it's not moving out.",
                    from,
                    to,
                    to
                );
            }
            if let Some(value) = record.fields.shift_remove(from) {
                record.fields.insert(to.clone(), value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::normalize;
    use serde_json::json;

    #[test]
    fn the_one_where_add_overwrites_and_remove_respects_the_timestamp() {
        let mut the_record = normalize(br#"{"env":"dev","secret":"hunter2"}"#);

        AddFields::new([("env", json!("prod"))]).apply(&mut the_record).unwrap();
        RemoveFields::new(["secret"]).apply(&mut the_record).unwrap();

        assert_eq!(the_record.fields["env"], json!("prod"));
        assert!(!the_record.fields.contains_key("secret"));
        assert!(RemoveFields::new([TIMESTAMP_FIELD]).apply(&mut the_record).is_err());
        assert!(the_record.fields.contains_key(TIMESTAMP_FIELD));
    }

    #[test]
    fn the_one_where_rename_will_not_evict_an_existing_tenant() {
        let mut the_record = normalize(br#"{"msg":"a","message":"b"}"#);

        assert!(RenameFields::new([("msg", "message")]).apply(&mut the_record).is_err());
        assert_eq!(the_record.fields["message"], json!("b"));

        let mut the_quiet_one = normalize(br#"{"other":1}"#);
        RenameFields::new([("msg", "message")]).apply(&mut the_quiet_one).unwrap();
        assert!(!the_quiet_one.fields.contains_key("message"));
    }

    #[test]
    fn the_one_where_the_timestamp_refuses_a_new_name() {
        let mut the_record = normalize(br#"{"a":1}"#);

        assert!(RenameFields::new([(TIMESTAMP_FIELD, "ts")]).apply(&mut the_record).is_err());
        assert!(the_record.fields.contains_key(TIMESTAMP_FIELD));
        assert!(!the_record.fields.contains_key("ts"));
    }
}
