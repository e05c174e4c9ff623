//! Error types for keepsake.

use thiserror::Error;
use uuid::Uuid;

use crate::owner::OwnerKind;

/// Result type alias using keepsake's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Detail carried by [`Error::Upload`]: which keys were attempted, which
/// failed, and which succeeded-then-had-to-be-removed after the rollback.
#[derive(Debug, Default)]
pub struct UploadFailure {
    /// Total number of blob writes attempted in the batch.
    pub attempted: usize,
    /// Keys whose upload failed.
    pub failed_keys: Vec<String>,
    /// Keys that uploaded successfully and were deleted (or ledgered) during
    /// compensation. The whole batch is rejected even if only one key failed.
    pub compensated_keys: Vec<String>,
}

/// Core error type for keepsake operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Owner row not found
    #[error("{kind} not found: {id}")]
    OwnerNotFound { kind: OwnerKind, id: Uuid },

    /// Caller-side input failure, checked before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness conflict, checked before opening the transaction
    #[error("Conflict: {0}")]
    Conflict(String),

    /// One or more blob writes failed; the transaction was rolled back and
    /// every completed upload was compensated
    #[error("Upload failed for {} of {} blobs", .0.failed_keys.len(), .0.attempted)]
    Upload(UploadFailure),

    /// Commit or rollback itself errored; fatal for the operation
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Blob store operation failed
    #[error("Blob store error: {0}")]
    Blob(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", e))
    }
}

impl Error {
    /// True when the error means "the thing you asked about does not exist",
    /// for callers that map errors to 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::OwnerNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("attachment 42".to_string());
        assert_eq!(err.to_string(), "Not found: attachment 42");
    }

    #[test]
    fn test_error_display_owner_not_found() {
        let id = Uuid::nil();
        let err = Error::OwnerNotFound {
            kind: OwnerKind::Album,
            id,
        };
        assert_eq!(err.to_string(), format!("album not found: {}", id));
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("gallery cap exceeded".to_string());
        assert_eq!(err.to_string(), "Validation error: gallery cap exceeded");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("natural key already in use".to_string());
        assert_eq!(err.to_string(), "Conflict: natural key already in use");
    }

    #[test]
    fn test_error_display_upload() {
        let err = Error::Upload(UploadFailure {
            attempted: 3,
            failed_keys: vec!["a/b/c.jpg".to_string()],
            compensated_keys: vec!["a/b/d.jpg".to_string(), "a/b/e.jpg".to_string()],
        });
        assert_eq!(err.to_string(), "Upload failed for 1 of 3 blobs");
    }

    #[test]
    fn test_error_display_transaction() {
        let err = Error::Transaction("commit failed".to_string());
        assert_eq!(err.to_string(), "Transaction error: commit failed");
    }

    #[test]
    fn test_error_display_blob() {
        let err = Error::Blob("backend unreachable".to_string());
        assert_eq!(err.to_string(), "Blob store error: backend unreachable");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(Error::OwnerNotFound {
            kind: OwnerKind::User,
            id: Uuid::nil()
        }
        .is_not_found());
        assert!(!Error::Validation("x".into()).is_not_found());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
