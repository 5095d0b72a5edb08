//! AST for the spec language.
//!
//! The parser produces `Service → Module → Component` trees whose type
//! nodes are fully resolved (references embed the referenced definition).
//! Serialized components become immutable parse records; the module's
//! canonical JSON digest is the identity used to detect duplicate saves.

mod module;
mod types;

pub use module::{Component, Module, Service};
pub use types::{Funcdef, Parameter, Scalar, ScalarKind, StructItem, StructType, Type, Typedef};
