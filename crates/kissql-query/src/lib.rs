//! KISSQL query language: tokenizer, parser, constraint compiler and
//! hybrid executor.
//!
//! ```text
//! "AI NOT Google category=tech | HEAD 5"
//!     → lexer::tokenize → parser → StructuredQuery
//!     → compiler → Predicates → executor (semantic ∥ structured)
//!     → ranker → limit → pipe chain → SearchResponse
//! ```

pub mod ast;
pub mod compiler;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod pipe;
pub mod ranker;
pub mod token;

pub use ast::{
    Connective, Constraint, ConstraintValue, Meta, Operator, PhraseTerm, PipeKind, PipeOp,
    SortDirection, StructuredQuery, TextTerm,
};
pub use compiler::{compile, compile_all, CompiledConstraint};
pub use executor::{BranchCancellation, ExecutorConfig, QueryExecutor};
pub use lexer::tokenize;
pub use parser::{parse, QueryParser};
pub use token::{Token, TokenKind};
