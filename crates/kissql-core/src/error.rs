//! Error types for KISSQL.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for KISSQL operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Query string could not be tokenized
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    /// Token stream could not be assembled into a query
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Retrieval failed
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Backend store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Malformed quoting or bracketing in the raw query string.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} at byte {offset}")]
pub struct LexError {
    /// Byte offset of the opening delimiter
    pub offset: usize,
    pub message: String,
}

impl LexError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// A token sequence that cannot form a structured query.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} at byte {offset}")]
pub struct ParseError {
    /// Byte offset of the offending token
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// A constraint whose value cannot be coerced for its operator.
///
/// Never fatal: the constraint is dropped and the error is reported as a
/// warning alongside the results.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("constraint `{constraint}`: {message}")]
pub struct TypeError {
    /// Canonical form of the offending constraint
    pub constraint: String,
    pub message: String,
}

/// Pipeline stage an execution failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    /// Semantic similarity retrieval
    SemanticRetrieval,
    /// Predicate pushdown and scans
    StructuredFilter,
    /// Both retrieval branches
    Retrieval,
    /// Candidate metadata lookup
    MetadataLookup,
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SemanticRetrieval => "semantic retrieval",
            Self::StructuredFilter => "structured filter",
            Self::Retrieval => "retrieval",
            Self::MetadataLookup => "metadata lookup",
        };
        f.write_str(name)
    }
}

/// Retrieval failure that left no usable candidates.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{stage} failed: {message}")]
pub struct ExecutionError {
    pub stage: ExecutionStage,
    pub message: String,
}

impl ExecutionError {
    pub fn new(stage: ExecutionStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Backend store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("corpus error: {0}")]
    Corpus(String),
}

/// Embedding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("empty input")]
    EmptyInput,
}

/// Result type alias for KISSQL operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Query Error Tests ==========

    #[test]
    fn test_lex_error_display() {
        let err = LexError::new(7, "unterminated quote");
        assert_eq!(err.to_string(), "unterminated quote at byte 7");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(0, "limit must be a non-negative integer");
        assert_eq!(
            err.to_string(),
            "limit must be a non-negative integer at byte 0"
        );
    }

    #[test]
    fn test_type_error_display() {
        let err = TypeError {
            constraint: "Score>high".to_string(),
            message: "`high` is not a number or date".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "constraint `Score>high`: `high` is not a number or date"
        );
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::new(ExecutionStage::Retrieval, "both branches failed");
        assert_eq!(err.to_string(), "retrieval failed: both branches failed");
    }

    #[test]
    fn test_execution_stage_serialization() {
        assert_eq!(
            serde_json::to_string(&ExecutionStage::SemanticRetrieval).unwrap(),
            "\"semantic_retrieval\""
        );
    }

    // ========== Backend Error Tests ==========

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Query("connection reset".to_string()).to_string(),
            "query failed: connection reset"
        );
        assert_eq!(StoreError::Timeout(250).to_string(), "timed out after 250 ms");
        assert_eq!(StoreError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_embed_error_display() {
        let err = EmbedError::Inference("bad input".to_string());
        assert_eq!(err.to_string(), "inference failed: bad input");
    }

    // ========== Main Error Tests ==========

    #[test]
    fn test_error_from_lex_error() {
        let err: Error = LexError::new(3, "unterminated in(").into();
        assert!(matches!(err, Error::Lex(_)));
        assert!(err.to_string().starts_with("lex error"));
    }

    #[test]
    fn test_error_from_parse_error() {
        let err: Error = ParseError::new(4, "dangling NOT").into();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_error_from_store_error() {
        let err: Error = StoreError::Query("timeout".to_string()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_error_config_display() {
        let err = Error::Config("invalid path".to_string());
        assert_eq!(err.to_string(), "config error: invalid path");
    }

    #[test]
    fn test_result_type_alias() {
        fn failing_function() -> Result<i32> {
            Err(Error::Config("test failure".to_string()))
        }

        assert!(failing_function().is_err());
    }
}
