//! Backend-neutral filter predicates.
//!
//! A [`Predicate`] is what a compiled constraint looks like to a store. Stores
//! may evaluate it natively or report it as unsupported, in which case the
//! executor falls back to [`Predicate::matches`] against candidate metadata.
//! Both paths share this evaluator so that pushdown and client-side checks
//! agree.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::{FieldValue, Metadata};

/// A value an ordering comparison can be made against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Comparable {
    Number(f64),
    Date(DateTime<Utc>),
}

impl Comparable {
    /// Parse a literal as a finite number, or failing that an ISO date.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<f64>() {
            return n.is_finite().then_some(Self::Number(n));
        }
        parse_date(raw).map(Self::Date)
    }

    /// Coerce a stored value to the same kind as `self`.
    fn coerce(&self, value: &FieldValue) -> Option<Self> {
        match (self, value) {
            (Self::Number(_), FieldValue::Number(n)) => Some(Self::Number(*n)),
            (Self::Number(_), FieldValue::Text(s)) => {
                s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).map(Self::Number)
            }
            (Self::Date(_), FieldValue::Text(s)) => parse_date(s.trim()).map(Self::Date),
            _ => None,
        }
    }

    pub fn same_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Number(_), Self::Number(_)) | (Self::Date(_), Self::Date(_))
        )
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Comparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Ordering comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

/// What a predicate tests. String operands are stored lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PredicateKind {
    /// Case-insensitive exact match
    Equals(String),
    Compare { op: CompareOp, bound: Comparable },
    /// Inclusive on both ends
    Range { lower: Comparable, upper: Comparable },
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    OneOf(Vec<String>),
    /// Field present and not null
    Exists,
}

/// A strictly boolean test against one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub kind: PredicateKind,
    pub negated: bool,
}

impl Predicate {
    pub fn new(field: impl Into<String>, kind: PredicateKind) -> Self {
        Self {
            field: field.into(),
            kind,
            negated: false,
        }
    }

    /// Flip polarity.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Evaluate against an article's metadata.
    ///
    /// Unknown or null fields never satisfy the positive form.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let positive = match metadata.get(&self.field) {
            None | Some(FieldValue::Null) => false,
            Some(value) => self.kind.matches_value(value),
        };
        positive != self.negated
    }
}

impl PredicateKind {
    fn matches_value(&self, value: &FieldValue) -> bool {
        if let FieldValue::List(items) = value {
            return match self {
                Self::Exists => true,
                _ => items.iter().any(|item| self.matches_value(item)),
            };
        }

        match self {
            Self::Exists => !value.is_null(),
            Self::Equals(needle) => equals_ignore_case(value, needle),
            Self::OneOf(options) => options.iter().any(|o| equals_ignore_case(value, o)),
            Self::Compare { op, bound } => bound
                .coerce(value)
                .and_then(|v| v.compare(bound))
                .is_some_and(|ordering| op.accepts(ordering)),
            Self::Range { lower, upper } => lower.coerce(value).is_some_and(|v| {
                v.compare(lower).is_some_and(|o| o != Ordering::Less)
                    && v.compare(upper).is_some_and(|o| o != Ordering::Greater)
            }),
            Self::StartsWith(needle) => text_of(value).is_some_and(|s| s.starts_with(needle.as_str())),
            Self::EndsWith(needle) => text_of(value).is_some_and(|s| s.ends_with(needle.as_str())),
            Self::Contains(needle) => text_of(value).is_some_and(|s| s.contains(needle.as_str())),
        }
    }
}

fn text_of(value: &FieldValue) -> Option<String> {
    value.as_text().map(str::to_lowercase)
}

fn equals_ignore_case(value: &FieldValue, needle: &str) -> bool {
    match value {
        FieldValue::Text(s) => s.to_lowercase() == needle,
        FieldValue::Number(n) => needle.trim().parse::<f64>().is_ok_and(|m| m == *n),
        FieldValue::Bool(b) => needle == if *b { "true" } else { "false" },
        FieldValue::Null | FieldValue::List(_) => false,
    }
}
