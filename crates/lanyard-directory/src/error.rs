//! Directory error types
//!
//! Error definitions with transient/permanent classification.

use thiserror::Error;

/// Error that can occur while talking to a directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory could not be reached or the session could not be
    /// established.
    #[error("directory unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An entry with the same distinguished name already exists
    /// (create/rename conflict, LDAP result code 68).
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The target entry of a save/rename/delete vanished between the search
    /// and the write (LDAP result code 32).
    #[error("entry missing: {dn}")]
    EntryMissing { dn: String },

    /// A distinguished name could not be parsed or composed.
    #[error("invalid distinguished name '{dn}': {message}")]
    InvalidDn { dn: String, message: String },

    /// The directory rejected an operation with a result code this layer has
    /// no dedicated variant for.
    #[error("directory operation failed with code {code}: {message}")]
    OperationFailed { code: u32, message: String },

    /// The connection configuration is invalid.
    #[error("invalid directory configuration: {message}")]
    Configuration { message: String },
}

impl DirectoryError {
    /// Check whether the error is transient; a later identical call may
    /// succeed without any configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable { .. })
    }

    /// Check whether the error is permanent and needs intervention.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification in logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::Unavailable { .. } => "DIRECTORY_UNAVAILABLE",
            DirectoryError::AlreadyExists { .. } => "ENTRY_EXISTS",
            DirectoryError::EntryMissing { .. } => "ENTRY_MISSING",
            DirectoryError::InvalidDn { .. } => "INVALID_DN",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
            DirectoryError::Configuration { .. } => "INVALID_CONFIG",
        }
    }

    // Convenience constructors

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error with source.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(dn: impl Into<String>) -> Self {
        DirectoryError::AlreadyExists { dn: dn.into() }
    }

    /// Create an entry-missing error.
    pub fn entry_missing(dn: impl Into<String>) -> Self {
        DirectoryError::EntryMissing { dn: dn.into() }
    }

    /// Create an invalid-DN error.
    pub fn invalid_dn(dn: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::InvalidDn {
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Create an operation-failed error from a directory result code.
    pub fn operation_failed(code: u32, message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            code,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        DirectoryError::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let err = DirectoryError::unavailable("network down");
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            DirectoryError::already_exists("cn=alice,dc=example,dc=com"),
            DirectoryError::entry_missing("cn=bob,dc=example,dc=com"),
            DirectoryError::invalid_dn("cn=", "missing value"),
            DirectoryError::operation_failed(53, "unwilling to perform"),
            DirectoryError::configuration("missing suffix"),
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DirectoryError::unavailable("x").error_code(),
            "DIRECTORY_UNAVAILABLE"
        );
        assert_eq!(
            DirectoryError::already_exists("x").error_code(),
            "ENTRY_EXISTS"
        );
        assert_eq!(
            DirectoryError::configuration("x").error_code(),
            "INVALID_CONFIG"
        );
    }

    #[test]
    fn test_error_display() {
        let err = DirectoryError::already_exists("cn=alice,ou=people,dc=example,dc=com");
        assert_eq!(
            err.to_string(),
            "entry already exists: cn=alice,ou=people,dc=example,dc=com"
        );

        let err = DirectoryError::operation_failed(50, "insufficient access rights");
        assert_eq!(
            err.to_string(),
            "directory operation failed with code 50: insufficient access rights"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = DirectoryError::unavailable_with_source("bind failed", source_err);

        assert!(err.is_transient());
        if let DirectoryError::Unavailable { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected Unavailable variant");
        }
    }
}
