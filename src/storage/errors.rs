//! Storage Port errors.

use thiserror::Error;

/// Result type for Storage Port operations.
pub type StorageResult<T> = Result<T, TypeStorageError>;

/// Failures surfaced by a Storage Port implementation.
///
/// The registry propagates these unchanged; it never retries or repairs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeStorageError {
    #[error("module {0} is not present in storage")]
    NoSuchModuleRecord(String),

    #[error("module version {1} is not present for module {0}")]
    NoSuchModuleVersion(String, u64),

    #[error("module {0} has no released version")]
    NoReleasedVersion(String),

    #[error("module {0} was already registered")]
    ModuleAlreadyRegistered(String),

    #[error("registration request for module {0} not found")]
    NoSuchRegistrationRequest(String),

    #[error("registration request for module {0} already exists")]
    DuplicateRegistrationRequest(String),

    #[error("storage I/O failure: {0}")]
    Io(String),

    #[error("storage encoding failure: {0}")]
    Encoding(String),
}

impl From<std::io::Error> for TypeStorageError {
    fn from(err: std::io::Error) -> Self {
        TypeStorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TypeStorageError {
    fn from(err: serde_json::Error) -> Self {
        TypeStorageError::Encoding(err.to_string())
    }
}
