//! The structured query produced by the parser.
//!
//! Constraints form a flat, ordered list. Each carries its own polarity
//! (`NOT`) and the connective joining it to everything before it, so a query
//! is evaluated strictly left to right without grouping.
//!
//! [`StructuredQuery`] implements [`Display`](fmt::Display) as canonical
//! query syntax: re-parsing the output yields an equal query.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed form of one query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub text_terms: Vec<TextTerm>,
    pub phrases: Vec<PhraseTerm>,
    pub constraints: Vec<Constraint>,
    pub meta: Meta,
    pub pipe_chain: Vec<PipeOp>,
}

impl StructuredQuery {
    /// True when nothing restricts the result set.
    pub fn is_match_all(&self) -> bool {
        self.text_terms.is_empty() && self.phrases.is_empty() && self.constraints.is_empty()
    }

    /// Free text to send to semantic retrieval: positive terms, then phrases.
    pub fn semantic_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .text_terms
            .iter()
            .filter(|t| !t.negated)
            .map(|t| t.term.as_str())
            .chain(
                self.phrases
                    .iter()
                    .filter(|p| !p.negated)
                    .map(|p| p.phrase.as_str()),
            )
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// A free-text word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextTerm {
    pub term: String,
    pub boost: Option<f32>,
    pub negated: bool,
}

impl TextTerm {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            boost: None,
            negated: false,
        }
    }

    pub fn weight(&self) -> f32 {
        self.boost.unwrap_or(1.0)
    }
}

/// A quoted phrase, optionally with a proximity distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseTerm {
    pub phrase: String,
    pub proximity: Option<u32>,
    pub boost: Option<f32>,
    pub negated: bool,
}

impl PhraseTerm {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            proximity: None,
            boost: None,
            negated: false,
        }
    }

    pub fn weight(&self) -> f32 {
        self.boost.unwrap_or(1.0)
    }
}

/// Constraint operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    StartsWith,
    EndsWith,
    Contains,
    In,
    Range,
    Has,
    NotHas,
}

impl Operator {
    /// Source symbol for operators written between field and value.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq | Self::In | Self::Range => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::StartsWith => "^=",
            Self::EndsWith => "$=",
            Self::Contains => "~=",
            Self::Has => "has:",
            Self::NotHas => "!has:",
        }
    }
}

/// Operand of a constraint, shaped by its operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConstraintValue {
    Scalar(String),
    List(Vec<String>),
    Range { lower: String, upper: String },
    None,
}

/// How a constraint joins the constraints before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connective {
    #[default]
    And,
    Or,
}

/// One structured filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub operator: Operator,
    pub value: ConstraintValue,
    pub boost: Option<f32>,
    pub negated: bool,
    pub connective: Connective,
}

impl Constraint {
    pub fn new(field: impl Into<String>, operator: Operator, value: ConstraintValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            boost: None,
            negated: false,
            connective: Connective::And,
        }
    }

    /// Shorthand for a scalar-valued constraint.
    pub fn scalar(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self::new(field, operator, ConstraintValue::Scalar(value.into()))
    }

    /// Boosted constraints rank candidates instead of filtering them.
    pub fn is_filter(&self) -> bool {
        self.boost.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Query-level directives. Repeats override earlier occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub sort_field: Option<String>,
    pub sort_dir: SortDirection,
    pub limit: Option<usize>,
    pub similar_id: Option<String>,
    pub cluster_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipeKind {
    Head,
    Tail,
    Sample,
}

/// A post-ranking trim step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeOp {
    pub kind: PipeKind,
    pub n: usize,
}

impl PipeOp {
    pub fn head(n: usize) -> Self {
        Self {
            kind: PipeKind::Head,
            n,
        }
    }

    pub fn tail(n: usize) -> Self {
        Self {
            kind: PipeKind::Tail,
            n,
        }
    }

    pub fn sample(n: usize) -> Self {
        Self {
            kind: PipeKind::Sample,
            n,
        }
    }
}

// ============================================================================
// Canonical syntax
// ============================================================================

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.contains("..")
        || value.to_ascii_lowercase().starts_with("in(")
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '|' | '(' | ')' | ','))
}

fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn value_literal(value: &str) -> String {
    if needs_quotes(value) {
        quoted(value)
    } else {
        value.to_string()
    }
}

/// `=` spelling for a field. `cluster=` is a directive, so that field uses `:`.
fn equals_symbol(field: &str) -> &'static str {
    if field.eq_ignore_ascii_case("cluster") {
        ":"
    } else {
        "="
    }
}

fn write_boost(f: &mut fmt::Formatter<'_>, boost: Option<f32>) -> fmt::Result {
    match boost {
        Some(w) => write!(f, "^{w}"),
        None => Ok(()),
    }
}

impl fmt::Display for PipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Head => "HEAD",
            Self::Tail => "TAIL",
            Self::Sample => "SAMPLE",
        })
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

impl fmt::Display for TextTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT ")?;
        }
        f.write_str(&self.term)?;
        write_boost(f, self.boost)
    }
}

impl fmt::Display for PhraseTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT ")?;
        }
        f.write_str(&quoted(&self.phrase))?;
        if let Some(k) = self.proximity {
            write!(f, "~{k}")?;
        }
        write_boost(f, self.boost)
    }
}

/// Writes the constraint without its polarity or connective.
impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.operator, &self.value) {
            (Operator::Has | Operator::NotHas, _) => {
                write!(f, "{}{}", self.operator.symbol(), self.field)
            }
            (Operator::In, ConstraintValue::List(items)) => {
                f.write_str(&self.field)?;
                write_boost(f, self.boost)?;
                let items: Vec<String> = items.iter().map(|i| value_literal(i)).collect();
                write!(f, "{}in({})", equals_symbol(&self.field), items.join(","))
            }
            (Operator::Range, ConstraintValue::Range { lower, upper }) => {
                f.write_str(&self.field)?;
                write_boost(f, self.boost)?;
                write!(f, "{}{lower}..{upper}", equals_symbol(&self.field))
            }
            (op, ConstraintValue::Scalar(value)) => {
                f.write_str(&self.field)?;
                write_boost(f, self.boost)?;
                let symbol = match op {
                    Operator::Eq => equals_symbol(&self.field),
                    op => op.symbol(),
                };
                write!(f, "{symbol}{}", value_literal(value))
            }
            (op, _) => {
                f.write_str(&self.field)?;
                write_boost(f, self.boost)?;
                f.write_str(op.symbol())
            }
        }
    }
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        parts.extend(self.text_terms.iter().map(ToString::to_string));
        parts.extend(self.phrases.iter().map(ToString::to_string));

        for (i, constraint) in self.constraints.iter().enumerate() {
            let mut part = String::new();
            if i > 0 && constraint.connective == Connective::Or {
                part.push_str("OR ");
            }
            if constraint.negated {
                part.push_str("NOT ");
            }
            part.push_str(&constraint.to_string());
            parts.push(part);
        }

        if let Some(field) = &self.meta.sort_field {
            parts.push(format!("sort:{field}:{}", self.meta.sort_dir));
        }
        if let Some(limit) = self.meta.limit {
            parts.push(format!("limit:{limit}"));
        }
        if let Some(id) = &self.meta.similar_id {
            parts.push(format!("similar:{id}"));
        }
        if let Some(cluster) = self.meta.cluster_id {
            parts.push(format!("cluster={cluster}"));
        }

        for pipe in &self.pipe_chain {
            parts.push(format!("| {} {}", pipe.kind, pipe.n));
        }

        f.write_str(&parts.join(" "))
    }
}
