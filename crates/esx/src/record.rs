// ai
//! 📦 Records — the humble envelope every ingested byte gets stuffed into.
//!
//! 🎬 *[a payload arrives. it claims to be JSON. it is lying. it is a stack trace.]*
//! *[the normalizer does not flinch. it wraps the liar in an `@error` and moves on.]*
//!
//! 🧠 Knowledge graph:
//! - [`normalize`] is the ONLY place malformed input becomes a well-formed [`Record`].
//!   Everything downstream (router, index resolver, workers) assumes a valid Record.
//! - [`VirtualField`]s (`day`, `today`, `month`, `year`) are computed at lookup time and
//!   never stored. They win over stored fields when looked up by name.
//! - [`Record::value`] is the two-tier lookup: virtual first, stored second.
//!
//! 🦆 (the duck was normalized once. it has an `@timestamp` now. it is not happy about it.)

use std::borrow::Cow;

use chrono::{Datelike, Local, SecondsFormat};
use serde_json::{Map, Value};

/// 🕰️ The field every record carries, no exceptions, no appeals.
pub const TIMESTAMP_FIELD: &str = "@timestamp";
/// 💀 Present only when the input was not a JSON object.
pub const ERROR_FIELD: &str = "@error";
/// 📜 The raw input, as text, when parsing gave up.
pub const MESSAGE_FIELD: &str = "message";

/// 🎯 What happens to a record once routing is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Accept,
    Drop,
}

/// 📅 Computed, never-stored fields derived from the local wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualField {
    /// `2024-01-05`
    Day,
    /// `5`, day of month, no padding
    Today,
    /// `2024-01`
    Month,
    /// `2024`
    Year,
}

impl VirtualField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "day" => Some(Self::Day),
            "today" => Some(Self::Today),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// 🕰️ Evaluate against "right now". Lazily. Every time. Time waits for no cache.
    pub fn evaluate(self) -> String {
        let now = Local::now();
        match self {
            Self::Day => now.format("%Y-%m-%d").to_string(),
            Self::Today => now.day().to_string(),
            Self::Month => now.format("%Y-%m").to_string(),
            Self::Year => now.format("%Y").to_string(),
        }
    }
}

/// 📦 One normalized unit of ingested data.
///
/// Lives for exactly one pipeline pass: born in [`normalize`], poked by the router,
/// stamped with a destination, then melted down into a [`WriteRequest`](crate::queue::WriteRequest).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Map<String, Value>,
    pub action: Action,
    /// 📡 Empty until the index resolver (or a dispatch action) assigns it.
    pub destination: String,
}

impl Record {
    /// 🏗️ A record from an already-parsed field map. Accepted, destination-less.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            action: Action::Accept,
            destination: String::new(),
        }
    }

    /// 🔍 Two-tier lookup: virtual fields first, stored fields second, `None` if neither.
    pub fn value(&self, key: &str) -> Option<Cow<'_, Value>> {
        if let Some(virtual_field) = VirtualField::from_name(key) {
            return Some(Cow::Owned(Value::String(virtual_field.evaluate())));
        }
        self.fields.get(key).map(Cow::Borrowed)
    }

    /// 🧵 String view of a field. Missing → `"nil"`, strings verbatim, everything else as compact JSON.
    pub fn field(&self, key: &str) -> String {
        match self.value(key) {
            Some(value) => value_to_string(&value),
            None => "nil".to_string(),
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.action == Action::Drop
    }

    pub fn drop_it(&mut self) {
        self.action = Action::Drop;
    }
}

/// 🧵 Render a JSON value the way index names and comparisons want to see it.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "nil".to_string(),
        other => other.to_string(),
    }
}

fn now_timestamp() -> Value {
    Value::String(Local::now().to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// 🚰 Turn raw bytes into a [`Record`]. Never fails. Not even on Fridays.
///
/// A JSON object becomes the field map with `@timestamp` injected (overwriting any the
/// producer sent). Anything else (broken JSON, a bare number, an array) becomes
/// `{"@timestamp", "@error", "message"}` so the rest of the pipeline never sees garbage.
pub fn normalize(raw: &[u8]) -> Record {
    let fields = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(mut fields)) => {
            fields.insert(TIMESTAMP_FIELD.to_string(), now_timestamp());
            fields
        }
        Ok(other) => error_fields(
            format!("expected a JSON object, got {}", json_kind(&other)),
            raw,
        ),
        Err(err) => error_fields(err.to_string(), raw),
    };
    Record::from_fields(fields)
}

fn error_fields(error: String, raw: &[u8]) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(TIMESTAMP_FIELD.to_string(), now_timestamp());
    fields.insert(ERROR_FIELD.to_string(), Value::String(error));
    fields.insert(
        MESSAGE_FIELD.to_string(),
        Value::String(String::from_utf8_lossy(raw).into_owned()),
    );
    fields
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_valid_json_keeps_its_fields_and_gains_a_timestamp() {
        let the_record = normalize(br#"{"host":"web-1","status":200}"#);

        assert_eq!(the_record.fields["host"], json!("web-1"));
        assert_eq!(the_record.fields["status"], json!(200));
        assert!(the_record.fields.contains_key(TIMESTAMP_FIELD));
        assert!(!the_record.fields.contains_key(ERROR_FIELD));
        assert_eq!(the_record.action, Action::Accept);
        assert!(the_record.destination.is_empty());
    }

    #[test]
    fn the_one_where_garbage_in_becomes_an_error_record_not_a_panic() {
        let the_inputs: Vec<&[u8]> = vec![
            b"not json at all",
            b"",
            b"{\"half\":",
            b"[1,2,3]",
            b"42",
            &[0xff, 0xfe, 0x00, 0x7b],
        ];

        for raw in the_inputs {
            let the_record = normalize(raw);
            assert!(
                the_record.fields.contains_key(TIMESTAMP_FIELD),
                "every record gets a timestamp, even {:?}",
                raw
            );
            assert!(the_record.fields.contains_key(ERROR_FIELD));
            assert_eq!(
                the_record.fields[MESSAGE_FIELD],
                json!(String::from_utf8_lossy(raw))
            );
            assert_eq!(the_record.action, Action::Accept);
        }
    }

    #[test]
    fn the_one_where_the_producer_sends_its_own_timestamp_and_we_overwrite_it() {
        let the_record = normalize(br#"{"@timestamp":"1999-12-31"}"#);
        assert_ne!(the_record.fields[TIMESTAMP_FIELD], json!("1999-12-31"));
    }

    #[test]
    fn the_one_where_virtual_fields_beat_stored_fields() {
        let the_record = normalize(br#"{"day":"not-today","year":1066}"#);
        let today = Local::now();

        assert_eq!(the_record.field("day"), today.format("%Y-%m-%d").to_string());
        assert_eq!(the_record.field("year"), today.format("%Y").to_string());
        assert_eq!(the_record.field("month"), today.format("%Y-%m").to_string());
        assert_eq!(the_record.field("today"), today.day().to_string());
    }

    #[test]
    fn the_one_where_missing_fields_are_nil_and_non_strings_are_json() {
        let the_record = normalize(br#"{"n":7,"ok":true,"nested":{"a":1},"s":"plain"}"#);

        assert_eq!(the_record.field("absent"), "nil");
        assert_eq!(the_record.field("n"), "7");
        assert_eq!(the_record.field("ok"), "true");
        assert_eq!(the_record.field("nested"), r#"{"a":1}"#);
        assert_eq!(the_record.field("s"), "plain");
    }
}
