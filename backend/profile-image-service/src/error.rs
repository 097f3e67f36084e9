//! Error types for profile image updates

use std::time::Duration;
use thiserror::Error;

use crate::domain::UserId;
use crate::repositories::StoreError;
use crate::services::image_source::ImageSourceError;

pub type Result<T> = std::result::Result<T, UpdateError>;

/// Failures surfaced to the caller of an update.
///
/// Only failures that block the authoritative write end up here. Anything
/// downstream of a landed write is logged instead.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Invalid image reference: {0:?}")]
    InvalidImageReference(String),

    #[error("Failed to write profile record: {0}")]
    AuthoritativeWriteFailed(#[source] StoreError),
}

impl UpdateError {
    /// Whether retrying the same update may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpdateError::AuthoritativeWriteFailed(StoreError::Unavailable(_))
        )
    }
}

/// Cache refresh failures. Never fatal to an update.
#[derive(Debug, Error)]
pub enum CacheRefreshError {
    #[error("Image source error: {0}")]
    Source(#[from] ImageSourceError),

    #[error("Image load timed out after {0:?}")]
    TimedOut(Duration),
}

/// Failures starting an explicit reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("No profile record for user {0}")]
    NotFound(UserId),

    #[error("Failed to read profile record: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UpdateError::Unauthenticated;
        assert_eq!(err.to_string(), "No authenticated user");

        let err = UpdateError::AuthoritativeWriteFailed(StoreError::Unavailable(
            "deadline exceeded".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Failed to write profile record: Record store unavailable: deadline exceeded"
        );
    }

    #[test]
    fn test_write_failure_keeps_source() {
        let err = UpdateError::AuthoritativeWriteFailed(StoreError::Rejected {
            document: "users/u1".to_string(),
            reason: "permission denied".to_string(),
        });
        let source = std::error::Error::source(&err).expect("source is kept");
        assert!(source.to_string().contains("permission denied"));
    }

    #[test]
    fn test_retryable() {
        assert!(
            UpdateError::AuthoritativeWriteFailed(StoreError::Unavailable("x".into()))
                .is_retryable()
        );
        assert!(!UpdateError::AuthoritativeWriteFailed(StoreError::Rejected {
            document: "users/u1".into(),
            reason: "x".into(),
        })
        .is_retryable());
        assert!(!UpdateError::Unauthenticated.is_retryable());
    }

    #[test]
    fn test_refresh_error_from_source() {
        let err: CacheRefreshError = ImageSourceError::NotFound("img".to_string()).into();
        assert!(matches!(err, CacheRefreshError::Source(_)));
    }
}
