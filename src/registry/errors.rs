//! Registry-level errors.

use thiserror::Error;

use crate::lock::LockError;
use crate::parser::SpecParseError;
use crate::storage::TypeStorageError;

/// Result type for registry operations.
pub type TypeDbResult<T> = Result<T, TypeDbError>;

/// Every failure the registry surfaces to its callers.
///
/// Errors propagate unchanged; the registry recovers nothing automatically
/// except the save-transaction rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeDbError {
    #[error("no such module: {0}")]
    NoSuchModule(String),

    #[error("no such type: {0}")]
    NoSuchType(String),

    #[error("no such function: {0}")]
    NoSuchFunc(String),

    #[error("no such privilege: {0}")]
    NoSuchPrivilege(String),

    #[error(transparent)]
    SpecParse(#[from] SpecParseError),

    #[error(transparent)]
    Storage(#[from] TypeStorageError),

    #[error("bad JSON schema document for {0}")]
    BadJsonSchemaDocument(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("configuration error: {0}")]
    Configuration(String),
}
