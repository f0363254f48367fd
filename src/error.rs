//! Central error types for stacklint.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` and `From` implementations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum StacklintError {
    /// IO operation failed (without path context - prefer IoWithPath when path is available)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO operation failed with path context for better error messages
    #[error("IO error at {path}: {error}")]
    IoWithPath {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Failed to parse a Go source file
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Tree-sitter grammar/query error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// Configuration error (invalid YAML, bad glob patterns, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An uncaught fault inside an analysis pass. The pass boundary converts
    /// panics into this variant so one bad input cannot take down the driver.
    #[error("internal fault in {analyzer}: {message}\n{backtrace}")]
    Internal {
        analyzer: &'static str,
        message: String,
        backtrace: String,
    },
}

/// Convenience type alias for Results using StacklintError.
pub type Result<T> = std::result::Result<T, StacklintError>;

impl StacklintError {
    /// Create an IO error with path context.
    ///
    /// Use this when reading files so the failing path ends up in the message.
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        StacklintError::IoWithPath {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }
}
