//! The structural type language.
//!
//! A type is one of: a named alias (`Typedef`), a homogeneous `List`, a
//! string-keyed `Mapping`, a fixed-arity `Tuple`, a `Scalar` (int, float,
//! string), an `UnspecifiedObject`, or a `Struct` of named fields.
//!
//! References to other typedefs are resolved at compile time by embedding a
//! deep copy of the referenced definition into the reference node, so a
//! serialized type is self-contained and can be diffed against a stored
//! parse record without further lookups.

use serde::{Deserialize, Serialize};

/// Scalar kinds of the type language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Int,
    Float,
    String,
}

impl ScalarKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::String => "string",
        }
    }
}

/// A scalar type, optionally carrying an `@id` reference annotation.
///
/// The annotation text participates in compatibility: two scalars with
/// different annotation text are not compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scalar {
    pub kind: ScalarKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_reference: Option<String>,
}

impl Scalar {
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            kind,
            id_reference: None,
        }
    }

    pub fn with_id_reference(kind: ScalarKind, id_reference: impl Into<String>) -> Self {
        Self {
            kind,
            id_reference: Some(id_reference.into()),
        }
    }
}

/// One field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructItem {
    pub name: String,
    pub item_type: Type,
    pub optional: bool,
}

/// A struct type: ordered named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    pub items: Vec<StructItem>,
}

/// A node of the structural type language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    /// A named alias; references to other typedefs appear as this node with
    /// the referenced definition embedded in `alias_type`.
    Typedef(Box<Typedef>),
    /// Homogeneous list of an element type.
    List(Box<Type>),
    /// Mapping with string keys; only the value type is structural.
    Mapping { key: Box<Type>, value: Box<Type> },
    /// Fixed-arity positional tuple.
    Tuple(Vec<Type>),
    Scalar(Scalar),
    /// An opaque JSON object; always compatible with itself.
    UnspecifiedObject,
    Struct(StructType),
}

impl Type {
    /// Short construct name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Typedef(_) => "typedef",
            Type::List(_) => "list",
            Type::Mapping { .. } => "mapping",
            Type::Tuple(_) => "tuple",
            Type::Scalar(_) => "scalar",
            Type::UnspecifiedObject => "unspecified object",
            Type::Struct(_) => "structure",
        }
    }
}

/// A named type definition belonging to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typedef {
    pub module: String,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub alias_type: Type,
}

impl Typedef {
    /// Deterministic JSON form, stored as the parse record for this type.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_canonical_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

/// One parameter (or return value) of a function definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub param_type: Type,
}

/// A named function definition belonging to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funcdef {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<Parameter>,
}

impl Funcdef {
    /// Deterministic JSON form, stored as the parse record for this function.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_canonical_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}
