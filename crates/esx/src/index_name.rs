// ai
//! 📡 Index names — "where does this document live?" answered one template at a time.
//!
//! An [`IndexTemplate`] is compiled once from a format string like `"app-%s-%s"` and a list
//! of references like `["$day", "prod"]`. References starting with `$` are looked up on the
//! record (virtual fields first), anything else is inserted verbatim. Missing lookups become
//! `"nil"`, because an index named `app-` is worse than one named `app-nil`.
//!
//! Placeholders: `%s`, `%v` and `%d` all mean "the next value". `%%` is a literal percent.
//! Anything else after a `%` is kept as written.

use anyhow::{Result, bail};

use crate::record::Record;

/// 🔖 Marks a reference as a record lookup rather than a literal.
pub const FIELD_PREFIX: char = '$';

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldRef {
    Literal(String),
    Lookup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot,
}

/// 🎯 A compiled destination-name resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTemplate {
    template: String,
    segments: Vec<Segment>,
    refs: Vec<FieldRef>,
}

impl IndexTemplate {
    /// 🏗️ Compile a template + references. Bad configs die here, not 10,000 docs later.
    ///
    /// Rejects `$` references with nothing after the prefix, and templates whose
    /// placeholder count does not match the number of references.
    pub fn compile<S: AsRef<str>>(template: &str, refs: &[S]) -> Result<Self> {
        if template.is_empty() {
            bail!("💀 The index template is empty. Documents need a home, and \"\" is not an address.");
        }

        let mut compiled_refs = Vec::with_capacity(refs.len());
        for raw in refs {
            let raw = raw.as_ref();
            match raw.strip_prefix(FIELD_PREFIX) {
                Some("") => bail!(
                    "💀 Index reference '{}' names no field. A '$' all by itself is a cry for help, not a lookup.",
                    raw
                ),
                Some(name) => compiled_refs.push(FieldRef::Lookup(name.to_string())),
                None => compiled_refs.push(FieldRef::Literal(raw.to_string())),
            }
        }

        if compiled_refs.is_empty() {
            // -- 🧊 constant resolver: the template IS the index name, percent signs and all
            return Ok(Self {
                template: template.to_string(),
                segments: vec![Segment::Text(template.to_string())],
                refs: compiled_refs,
            });
        }

        let segments = parse_segments(template);
        let slots = segments.iter().filter(|s| **s == Segment::Slot).count();
        if slots != compiled_refs.len() {
            bail!(
                "💀 Index template '{}' has {} placeholder(s) but {} reference(s) were given. The math is not mathing.",
                template,
                slots,
                compiled_refs.len()
            );
        }

        Ok(Self {
            template: template.to_string(),
            segments,
            refs: compiled_refs,
        })
    }

    /// 🧊 A resolver that always answers with `name`.
    pub fn constant(name: &str) -> Result<Self> {
        Self::compile::<&str>(name, &[])
    }

    /// 📡 Resolve the destination for `record`. Pure in (template, refs, record fields, clock).
    pub fn resolve(&self, record: &Record) -> String {
        if self.refs.is_empty() {
            return self.template.clone();
        }

        let mut values = self.refs.iter().map(|field_ref| match field_ref {
            FieldRef::Literal(text) => text.clone(),
            FieldRef::Lookup(key) => record.field(key),
        });

        let mut name = String::with_capacity(self.template.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => name.push_str(text),
                // -- compile() guarantees one value per slot
                Segment::Slot => name.push_str(&values.next().unwrap_or_default()),
            }
        }
        name
    }

    /// 📡 Resolve and stamp the destination onto the record.
    pub fn assign(&self, record: &mut Record) {
        record.destination = self.resolve(record);
    }
}

fn parse_segments(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') | Some('v') | Some('d') => {
                chars.next();
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Slot);
            }
            Some('%') => {
                chars.next();
                text.push('%');
            }
            _ => text.push('%'),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::normalize;
    use chrono::Local;

    #[test]
    fn the_one_where_day_lands_in_the_index_name() {
        let the_template = IndexTemplate::compile("app-%s", &["$day"]).expect("valid template");
        let the_record = normalize(br#"{"msg":"hi"}"#);

        let expected = format!("app-{}", Local::now().format("%Y-%m-%d"));
        assert_eq!(the_template.resolve(&the_record), expected);
    }

    #[test]
    fn the_one_where_no_refs_means_the_template_is_the_answer() {
        let the_template = IndexTemplate::compile::<&str>("static-index", &[]).expect("valid");

        for raw in [&br#"{"day":"x"}"#[..], b"garbage", br#"{"index":"other"}"#] {
            assert_eq!(the_template.resolve(&normalize(raw)), "static-index");
        }

        // -- 🧊 percent signs are just characters when nobody asked for substitution
        let the_weird_one = IndexTemplate::constant("logs-%s").expect("valid");
        assert_eq!(the_weird_one.resolve(&normalize(b"{}")), "logs-%s");
    }

    #[test]
    fn the_one_where_literals_lookups_and_missing_fields_mix() {
        let the_template =
            IndexTemplate::compile("%s-%s-%d-%%-%v", &["evt", "$host", "$port", "$missing"])
                .expect("valid template");
        let the_record = normalize(br#"{"host":"db-2","port":5432}"#);

        assert_eq!(the_template.resolve(&the_record), "evt-db-2-5432-%-nil");
    }

    #[test]
    fn the_one_where_resolution_is_deterministic() {
        let the_template = IndexTemplate::compile("t-%s-%s", &["$a", "$b"]).expect("valid");
        let the_record = normalize(br#"{"a":"one","b":{"nested":true}}"#);

        let first = the_template.resolve(&the_record);
        let second = the_template.resolve(&the_record.clone());
        assert_eq!(first, second);
        assert_eq!(first, r#"t-one-{"nested":true}"#);
    }

    #[test]
    fn the_one_where_bad_configs_are_bounced_at_the_door() {
        assert!(IndexTemplate::compile("x-%s", &["$"]).is_err());
        assert!(IndexTemplate::compile("x-%s-%s", &["$day"]).is_err());
        assert!(IndexTemplate::compile("x", &["$day"]).is_err());
        assert!(IndexTemplate::compile::<&str>("", &[]).is_err());
    }

    #[test]
    fn the_one_where_assign_stamps_the_record() {
        let the_template = IndexTemplate::compile("svc-%s", &["$service"]).expect("valid");
        let mut the_record = normalize(br#"{"service":"auth"}"#);

        the_template.assign(&mut the_record);
        assert_eq!(the_record.destination, "svc-auth");
    }
}
