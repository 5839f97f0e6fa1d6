//! Error types for Cachestore

use cachestore_types::ValidationError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid profile: {0}")]
    Validation(#[from] ValidationError),

    #[error("Profile already exists: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Data integrity error for {uid}: {reason}")]
    Integrity { uid: String, reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{tier} operation timed out after {elapsed:?}")]
    Timeout {
        tier: &'static str,
        elapsed: Duration,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl StoreError {
    /// True for failures of the durable tier itself, as opposed to bad input.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, StoreError::Validation(_) | StoreError::Duplicate(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        assert!(!StoreError::Validation(ValidationError::EmptyUid).is_infrastructure());
        assert!(!StoreError::Duplicate("u1".into()).is_infrastructure());
        assert!(StoreError::Database("connection refused".into()).is_infrastructure());
        assert!(StoreError::Timeout {
            tier: "durable",
            elapsed: Duration::from_millis(5)
        }
        .is_infrastructure());
    }

    #[test]
    fn test_integrity_message_names_uid() {
        let err = StoreError::Integrity {
            uid: "u1".into(),
            reason: "2 rows".into(),
        };
        assert_eq!(err.to_string(), "Data integrity error for u1: 2 rows");
    }
}
