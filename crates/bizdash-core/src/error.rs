//! Error types for the Bizdash engine.

use thiserror::Error;

/// A shared error type for the whole engine.
///
/// Variants follow the recovery policy of each failure class: caller errors
/// (`NotFound`, `UnknownRecord`, `DuplicateRecord`) are surfaced immediately,
/// persistence failures are recovered by the store, and sync failures are
/// split into retryable (`ServiceUnavailable`) and blocking (`AuthFailure`).
#[derive(Error, Debug, Clone)]
pub enum BizdashError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The slice exists but holds no record with this key
    #[error("Unknown record '{record_key}' in slice '{slice}'")]
    UnknownRecord { slice: String, record_key: String },

    /// A record with this key already exists in the slice
    #[error("Record '{record_key}' already exists in slice '{slice}'")]
    DuplicateRecord { slice: String, record_key: String },

    /// The storage medium could not be reached or read
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Stored bytes failed structural validation; the raw bytes are kept
    #[error("Corrupt snapshot ({} bytes): {reason}", .raw.len())]
    Corrupt { reason: String, raw: Vec<u8> },

    /// A mutation could not be made durable and was rolled back
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Transient failure of the external sheet service
    #[error("Service unavailable for slice '{slice}': {message}")]
    ServiceUnavailable { slice: String, message: String },

    /// The external sheet service rejected our credentials
    #[error("Authentication failed for slice '{slice}': {message}")]
    AuthFailure { slice: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BizdashError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a NotFound error for a slice name
    pub fn slice_not_found(name: impl Into<String>) -> Self {
        Self::not_found("Slice", name)
    }

    /// Creates an UnknownRecord error
    pub fn unknown_record(slice: impl Into<String>, record_key: impl Into<String>) -> Self {
        Self::UnknownRecord {
            slice: slice.into(),
            record_key: record_key.into(),
        }
    }

    /// Creates a Corrupt error carrying the unreadable bytes
    pub fn corrupt(reason: impl Into<String>, raw: Vec<u8>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
            raw,
        }
    }

    /// Creates a ServiceUnavailable error
    pub fn service_unavailable(slice: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            slice: slice.into(),
            message: message.into(),
        }
    }

    /// Creates an AuthFailure error
    pub fn auth_failure(slice: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthFailure {
            slice: slice.into(),
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Corrupt error
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    /// Check if this is an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }

    /// Check if the failed operation should be attempted again on a later pass.
    ///
    /// Only transient service and persistence failures qualify; an
    /// authentication failure needs fresh credentials first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::PersistenceUnavailable(_) | Self::Io { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for BizdashError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for BizdashError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for BizdashError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, BizdashError>`.
pub type Result<T> = std::result::Result<T, BizdashError>;
