//! Error types for tuple reconciliation.

use thiserror::Error;

use crate::namespace::Namespace;

/// Errors that can occur while reconciling tuples.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Legacy relational query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The tuple store rejected or failed a request.
    #[error("Tuple store error: {message}")]
    Store { message: String },

    /// Transport failure talking to the tuple store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lock service failure (not raised when the lock is merely held elsewhere).
    #[error("Lock error: {message}")]
    Lock { message: String },

    /// A tuple or object identifier could not be parsed.
    #[error("Invalid tuple value '{value}': {message}")]
    InvalidTuple { value: String, message: String },

    /// A named reconciler failed for one namespace.
    #[error("Reconciler '{reconciler}' failed in namespace {namespace}: {source}")]
    Reconciler {
        reconciler: String,
        namespace: Namespace,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Create a tuple store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a lock error.
    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    /// Create an invalid tuple error.
    pub fn invalid_tuple(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTuple {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Wrap an error with the reconciler and namespace it came from.
    pub fn reconciler(reconciler: impl Into<String>, namespace: Namespace, source: Self) -> Self {
        Self::Reconciler {
            reconciler: reconciler.into(),
            namespace,
            source: Box::new(source),
        }
    }

    /// Check if this error is worth retrying on the next tick.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Http(_) | Self::Store { .. } | Self::Lock { .. } => true,
            Self::Reconciler { source, .. } => source.is_retryable(),
            Self::Serialization(_) | Self::InvalidTuple { .. } => false,
        }
    }
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::store("write rejected");
        assert_eq!(err.to_string(), "Tuple store error: write rejected");

        let err = SyncError::invalid_tuple("team", "missing ':'");
        assert!(err.to_string().contains("team"));
        assert!(err.to_string().contains("missing ':'"));
    }

    #[test]
    fn test_reconciler_wrapper() {
        let err = SyncError::reconciler(
            "team_membership",
            Namespace::Org(2),
            SyncError::store("unavailable"),
        );
        let message = err.to_string();
        assert!(message.contains("team_membership"));
        assert!(message.contains("org-2"));
        assert!(message.contains("unavailable"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(SyncError::store("timeout").is_retryable());
        assert!(SyncError::lock("connection reset").is_retryable());
        assert!(!SyncError::invalid_tuple("x", "y").is_retryable());
    }
}
