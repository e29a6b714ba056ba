//! Search error types.

use thiserror::Error;

/// Errors that can occur during search index operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Stored document is missing a field or carries an unreadable value
    #[error("Invalid document {doc_id}: {reason}")]
    InvalidDocument { doc_id: String, reason: String },

    /// Index writer lock poisoned
    #[error("Index is locked: {0}")]
    IndexLocked(String),
}
