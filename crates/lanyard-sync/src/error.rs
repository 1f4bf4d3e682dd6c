//! Synchronization error types

use lanyard_directory::DirectoryError;
use thiserror::Error;

/// Errors surfaced by the synchronization layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The directory operation itself failed.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// A lookup that must identify one entry matched several.
    #[error("ambiguous directory result: {attribute}={value} matches more than one entry")]
    Ambiguous { attribute: String, value: String },

    /// A role that should be granted does not exist locally.
    #[error("role not found: {role}")]
    RoleNotFound { role: String },

    /// The local user store failed.
    #[error("user store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A user notification could not be delivered.
    #[error("notification failed: {message}")]
    Notification { message: String },

    /// The synchronization configuration is unusable.
    #[error("invalid sync configuration: {message}")]
    Configuration { message: String },
}

impl SyncError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Directory(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Directory(e) => e.error_code(),
            Self::Ambiguous { .. } => "AMBIGUOUS_RESULT",
            Self::RoleNotFound { .. } => "ROLE_NOT_FOUND",
            Self::Store { .. } => "STORE_ERROR",
            Self::Notification { .. } => "NOTIFICATION_FAILED",
            Self::Configuration { .. } => "INVALID_CONFIG",
        }
    }

    pub fn ambiguous(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Ambiguous {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn role_not_found(role: impl Into<String>) -> Self {
        Self::RoleNotFound { role: role.into() }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Convenience result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_errors_convert() {
        let err: SyncError = DirectoryError::unavailable("down").into();
        assert!(err.is_transient());
        assert_eq!(err.error_code(), "DIRECTORY_UNAVAILABLE");
    }

    #[test]
    fn test_permanent_errors() {
        let errors = vec![
            SyncError::ambiguous("uid", "jdoe"),
            SyncError::role_not_found("Registered users"),
            SyncError::store("insert failed"),
            SyncError::notification("smtp refused"),
            SyncError::configuration("recovery without redirect"),
        ];
        for err in errors {
            assert!(!err.is_transient(), "{err} should be permanent");
        }
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::ambiguous("uid", "jdoe");
        assert_eq!(
            err.to_string(),
            "ambiguous directory result: uid=jdoe matches more than one entry"
        );
        assert_eq!(
            SyncError::role_not_found("Members").to_string(),
            "role not found: Members"
        );
    }
}
