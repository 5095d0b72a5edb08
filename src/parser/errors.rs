//! Spec-language and save-pipeline validation errors.

use thiserror::Error;

/// Result type for spec compilation.
pub type SpecParseResult<T> = Result<T, SpecParseError>;

/// Errors from compiling a spec document or validating a save request.
///
/// The save pipeline funnels its own validation failures through this type
/// as well, so callers see one error kind for "the submitted spec (or the
/// way it was submitted) is not acceptable".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecParseError {
    #[error("wrong include structure (expected #include <file_path>): {0}")]
    MalformedInclude(String),

    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unknown type at line {line}: {name}")]
    UnknownType { line: usize, name: String },

    #[error("duplicate definition of {0}")]
    DuplicateDefinition(String),

    #[error("included module {0} was not provided to the compiler")]
    MissingInclude(String),

    #[error("cyclic include of module {0}")]
    CyclicInclude(String),

    #[error("spec-file should consist of only one service (found {0})")]
    NotOneService(usize),

    #[error("spec-file should consist of only one module (found {0})")]
    NotOneModule(usize),

    #[error("JSON schema generation was missed for module: {0}")]
    SchemaGenerationMissing(String),

    #[error("JSON schema wasn't generated for type: {0}")]
    SchemaMissingForType(String),

    #[error("reference to external not registered module/type is missing: {0}")]
    UnresolvedReference(String),

    #[error("type is in adding type list but is not defined in spec-file: {0}")]
    AddedTypeNotInSpec(String),

    #[error("type was already registered before: {0}")]
    TypeAlreadyRegistered(String),

    #[error("type is in unregistering type list but was not already registered: {0}")]
    TypeNotRegistered(String),

    #[error("type couldn't be in both adding and unregistering lists: {0}")]
    TypeInBothLists(String),

    #[error("there is no difference between previous and current versions of module {0}")]
    NoDifference(String),

    #[error("concurrent modification: previous module version is {actual} (but should be {expected})")]
    ConcurrentModification { actual: u64, expected: u64 },

    #[error("version of dependent module {path} is not compatible with module version restriction: {restriction}")]
    PinnedVersionMismatch { path: String, restriction: u64 },

    #[error("incompatible module dependencies: {0} and {1}")]
    DependencyVersionConflict(String, String),

    #[error("outputs of the two spec parsers are different")]
    ParserOutputMismatch,

    #[error("unexpected error during spec-file parsing: {0}")]
    Internal(String),
}
