// ai
//! 🔍 Conditions — tiny boolean bouncers that stand in front of the pipeline.
//!
//! A [`Condition`] is a list of comparisons like `host = web-1` or `status >= 500`, ANDed
//! together. Drop filters hold a list of Conditions and drop on ANY match. Dispatch cases
//! hold one each.
//!
//! ```text
//!   key  op  value
//!   ───  ──  ─────
//!   host  =  web-1        equal
//!   lvl  !=  debug        not equal
//!   code >=  500          numeric when both sides are numbers, lexical otherwise
//!   path *=  /admin       contains
//!   path ^=  /api         starts with
//!   file $=  .log         ends with
//! ```
//!
//! A missing field compares as the string `"nil"`. Yes, `x = nil` matches records without `x`.
//! That's a feature. We checked.

use std::cmp::Ordering;
use std::fmt;

use anyhow::{Result, bail};

use crate::record::Record;

/// 🔍 Anything that can look at a record and say yes or no.
pub trait Predicate: fmt::Debug + Send + Sync {
    fn matches(&self, record: &Record) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    Prefix,
    Suffix,
}

// -- two-char operators first, or `>=` would be read as `>` followed by `=value`
const OPERATORS: &[(&str, Op)] = &[
    ("!=", Op::Ne),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("*=", Op::Contains),
    ("^=", Op::Prefix),
    ("$=", Op::Suffix),
    ("=", Op::Eq),
    (">", Op::Gt),
    ("<", Op::Lt),
];

/// 📏 One `key op value` comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub key: String,
    pub op: Op,
    pub value: String,
}

impl Comparison {
    /// 🔧 Parse `"key op value"`. Whitespace around the parts is trimmed.
    pub fn parse(expr: &str) -> Result<Self> {
        // -- leftmost operator wins; ties at the same position go to the longer token
        let found = OPERATORS
            .iter()
            .filter_map(|(token, op)| expr.find(token).map(|pos| (pos, *token, *op)))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));

        let Some((pos, token, op)) = found else {
            bail!(
                "💀 '{}' has no operator. Expected something like 'key = value'. We looked for =, !=, >, >=, <, <=, *=, ^=, $=. Found vibes.",
                expr
            );
        };

        let key = expr[..pos].trim();
        let value = expr[pos + token.len()..].trim();
        if key.is_empty() {
            bail!("💀 '{}' compares nothing to '{}'. The left side needs a field name.", expr, value);
        }

        Ok(Self {
            key: key.to_string(),
            op,
            value: value.to_string(),
        })
    }

    pub fn evaluate(&self, record: &Record) -> bool {
        let actual = record.field(&self.key);
        let expected = self.value.as_str();
        match self.op {
            Op::Eq => actual == expected,
            Op::Ne => actual != expected,
            Op::Contains => actual.contains(expected),
            Op::Prefix => actual.starts_with(expected),
            Op::Suffix => actual.ends_with(expected),
            Op::Gt => compare(&actual, expected) == Ordering::Greater,
            Op::Ge => compare(&actual, expected) != Ordering::Less,
            Op::Lt => compare(&actual, expected) == Ordering::Less,
            Op::Le => compare(&actual, expected) != Ordering::Greater,
        }
    }
}

fn compare(actual: &str, expected: &str) -> Ordering {
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.cmp(expected),
    }
}

/// 🔍 All comparisons must hold. An empty condition matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    comparisons: Vec<Comparison>,
}

impl Condition {
    pub fn parse<S: AsRef<str>>(exprs: &[S]) -> Result<Self> {
        let comparisons = exprs
            .iter()
            .map(|expr| Comparison::parse(expr.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { comparisons })
    }
}

impl Predicate for Condition {
    fn matches(&self, record: &Record) -> bool {
        !self.comparisons.is_empty() && self.comparisons.iter().all(|c| c.evaluate(record))
    }
}
