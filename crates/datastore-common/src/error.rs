//! Error types for the keyed datastore.

use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Primary error type for dataset, key and content operations.
#[derive(Debug, Error)]
pub enum StoreError {
    // === Caller Errors ===
    /// Duplicate key, dimension clash, key outside a keyspace, missing name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the current state of the object.
    #[error("Invalid state: {0}")]
    Logic(String),

    /// Metadata node or primitive of the wrong kind.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    Type { expected: String, actual: String },

    #[error("Failed to parse value: {0}")]
    Parse(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    // === Storage Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Logic error.
    pub fn logic(msg: impl Into<String>) -> Self {
        Self::Logic(msg.into())
    }

    /// Create a Type error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Type {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Short machine-readable code, used in CLI output and logs.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidArgument(_) => "InvalidArgument",
            StoreError::Logic(_) => "InvalidState",
            StoreError::Type { .. } => "TypeMismatch",
            StoreError::Parse(_) => "ParseFailure",
            StoreError::Unsupported(_) => "Unsupported",
            StoreError::Io(_) | StoreError::Storage(_) => "StorageFailure",
            StoreError::Serialization(_) => "SerializationFailure",
            StoreError::Config(_) => "ConfigurationError",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(format!("JSON error: {}", err))
    }
}
