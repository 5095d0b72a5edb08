//! Identifier parsing errors.

use thiserror::Error;

/// Errors from parsing versions, digests, and type identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("invalid semantic version (expected <major>.<minor>): {0}")]
    InvalidVersion(String),

    #[error("invalid MD5 digest: {0}")]
    InvalidMd5(String),

    #[error("invalid type name (expected Module.Type): {0}")]
    InvalidTypeName(String),

    #[error("invalid type id: {0}")]
    InvalidTypeId(String),
}
