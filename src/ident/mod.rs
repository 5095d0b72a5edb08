//! Identifier vocabulary for the type-definition database.
//!
//! This module provides:
//! - `SemanticVersion` - `<major>.<minor>` with numeric ordering
//! - `Md5Hash` - canonical digest identity for schemas and ASTs
//! - `TypeDefName` / `TypeDefId` / `AbsoluteTypeDefId` - type references
//! - `ModuleDefId` - module references

mod errors;
mod md5;
mod module_def;
mod semver;
mod type_def;

pub use errors::IdentError;
pub use md5::Md5Hash;
pub use module_def::ModuleDefId;
pub use semver::SemanticVersion;
pub use type_def::{AbsoluteTypeDefId, TypeDefId, TypeDefName};
