//! Error types for the reconciliation job.

use resync_search::SearchError;
use resync_storage::StorageError;
use resync_types::ResyncError;
use thiserror::Error;

/// Errors that can occur while reconciling the index
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Missing or invalid thresholds; the run never starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another run holds the job lease
    #[error("Job already running: {job}")]
    AlreadyRunning { job: String },

    /// System-of-record storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Search index failure
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Store adapter failure not covered above
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Worker task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

impl From<ResyncError> for ReconcileError {
    fn from(err: ResyncError) -> Self {
        match err {
            ResyncError::Config(msg) => ReconcileError::Config(msg),
            other => ReconcileError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconcileError::AlreadyRunning {
            job: "index-db-resync".to_string(),
        };
        assert_eq!(err.to_string(), "Job already running: index-db-resync");

        let err = ReconcileError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn test_from_config_error() {
        let err: ReconcileError = ResyncError::Config("batch_size must be > 0".to_string()).into();
        assert_eq!(err.to_string(), "Configuration error: batch_size must be > 0");
    }
}
