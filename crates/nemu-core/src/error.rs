//! Error types for nemu operations.
//!
//! Storage problems come in two flavours: the store is not attached yet
//! (`StorageUnavailable`) or a single call against it failed (`Storage`,
//! `Search`). Callers use [`NemuError::is_storage`] to tell those apart from
//! configuration and validation mistakes.

use thiserror::Error;

/// Result type alias for nemu operations.
pub type NemuResult<T> = Result<T, NemuError>;

/// Main error type for all nemu operations.
#[derive(Error, Debug)]
pub enum NemuError {
    /// The backing store is unreachable or has not been attached yet.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String, code: ErrorCode },

    /// An individual storage call failed.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The full-text trigger index failed.
    #[error("Search index error: {message}")]
    Search {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (STORE_xxx)
    StoreNotReady,
    StoreOperationFailed,
    StoreLockPoisoned,

    // Search index (IDX_xxx)
    IdxOperationFailed,
    IdxQueryFailed,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValEmptyText,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StoreNotReady => "STORE_001",
            ErrorCode::StoreOperationFailed => "STORE_002",
            ErrorCode::StoreLockPoisoned => "STORE_003",
            ErrorCode::IdxOperationFailed => "IDX_001",
            ErrorCode::IdxQueryFailed => "IDX_002",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValEmptyText => "VAL_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl NemuError {
    /// Create a storage-unavailable error.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            code: ErrorCode::StoreNotReady,
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoreOperationFailed,
            source: None,
        }
    }

    /// Create a storage error for a poisoned connection lock.
    pub fn lock_poisoned(what: &str) -> Self {
        Self::Storage {
            message: format!("{} lock poisoned", what),
            code: ErrorCode::StoreLockPoisoned,
            source: None,
        }
    }

    /// Create a search index error.
    pub fn search(message: impl Into<String>) -> Self {
        Self::Search {
            message: message.into(),
            code: ErrorCode::IdxOperationFailed,
            source: None,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error for text that is empty once trimmed.
    pub fn empty_text(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValEmptyText,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StorageUnavailable { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::Search { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error came from the backing store or its index.
    ///
    /// These are the failures `answer` degrades to "no match" and `teach`
    /// reports as a lesson that was not kept.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::Storage { .. } | Self::Search { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::StorageUnavailable { .. } => {
                Some("The knowledge store is still connecting; retry shortly")
            }
            Self::Storage { .. } => Some("Please check the knowledge database path and permissions"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for NemuError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
            code: ErrorCode::StoreOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

impl From<tantivy::TantivyError> for NemuError {
    fn from(err: tantivy::TantivyError) -> Self {
        Self::Search {
            message: err.to_string(),
            code: ErrorCode::IdxOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}
