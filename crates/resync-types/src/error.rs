//! Error types for the resync system.

use thiserror::Error;

/// Unified error type for shared domain operations.
#[derive(Debug, Error)]
pub enum ResyncError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResyncError::Config("batch_size must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: batch_size must be > 0"
        );

        let err = ResyncError::InvalidInput("unknown status: foo".to_string());
        assert_eq!(err.to_string(), "Invalid input: unknown status: foo");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ResyncError = json_err.into();
        assert!(matches!(err, ResyncError::Serialization(_)));
    }
}
