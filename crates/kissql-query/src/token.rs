//! Lexical tokens.

use serde::{Deserialize, Serialize};

use crate::ast::Operator;

/// A classified lexical unit and the byte offset it started at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Token kinds. A `^n` boost suffix is carried on the token it decorates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    /// Bare free-text word
    Word { text: String, boost: Option<f32> },
    /// Double-quoted span, word order preserved
    Phrase { text: String, boost: Option<f32> },
    /// Quoted span with a `~k` distance
    ProximityPhrase {
        text: String,
        distance: u32,
        boost: Option<f32>,
    },
    /// `field op value`
    FieldExpr {
        field: String,
        op: Operator,
        value: String,
        boost: Option<f32>,
    },
    /// `field=in(a,b,c)`
    SetExpr {
        field: String,
        values: Vec<String>,
        boost: Option<f32>,
    },
    /// `has:field` / `!has:field`
    ExistenceExpr { field: String, present: bool },
    /// `field=a..b`, inclusive on both ends
    RangeExpr {
        field: String,
        lower: String,
        upper: String,
        boost: Option<f32>,
    },
    /// `sort:`, `limit:`, `similar:`, `cluster=`
    MetaDirective { key: MetaKey, value: String },
    LogicalOp(LogicalOp),
    /// One `| NAME [ARG]` segment; validated by the parser
    PipeOp { name: String, args: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaKey {
    Sort,
    Limit,
    Similar,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}
