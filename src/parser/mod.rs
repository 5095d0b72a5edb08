//! Parser Port: compiling spec documents into ASTs and JSON schemas.
//!
//! The registry depends on the `SpecParser` trait only. The built-in
//! `InternalParser` compiles in-process; an embedder may supply an external
//! backend (typically one that shells out over files staged in a scratch
//! directory), and `ParserSource::Both` runs the two side by side and fails
//! loudly when their outputs diverge.

mod errors;
pub mod include;
mod internal;
mod lexer;
mod schema_gen;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::Service;

pub use errors::{SpecParseError, SpecParseResult};
pub use internal::InternalParser;
pub use schema_gen::schema_document;

/// Which compiler backend the registry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserSource {
    #[default]
    Internal,
    External,
    /// Run both backends and require equal output. Development aid.
    Both,
}

/// Result of compiling a spec document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    /// Compiled services; valid registry input has exactly one, holding
    /// exactly one module.
    pub services: Vec<Service>,
    /// Generated JSON-Schema documents: module name → type name → document.
    pub schemas: BTreeMap<String, BTreeMap<String, String>>,
}

/// A spec compiler backend.
///
/// `includes` maps each module of the include closure to its spec text.
/// `work_dir`, when given, is a scratch directory holding the same content
/// staged as files (`currentlyCompiled.spec` plus one `<Module>.types` per
/// include) for backends that compile out of process.
pub trait SpecParser: Send + Sync {
    fn compile(
        &self,
        spec: &str,
        includes: &BTreeMap<String, String>,
        work_dir: Option<&Path>,
    ) -> SpecParseResult<CompileOutput>;
}

/// Run the external and internal backends side by side.
///
/// On success both outputs must be equal; the external output is returned.
/// When only one backend fails, the divergence is logged before the error
/// propagates.
pub fn compile_dual(
    external: &dyn SpecParser,
    internal: &InternalParser,
    spec: &str,
    includes: &BTreeMap<String, String>,
    work_dir: Option<&Path>,
) -> SpecParseResult<CompileOutput> {
    let external_out = external.compile(spec, includes, work_dir);
    let internal_out = internal.compile(spec, includes, None);
    match (external_out, internal_out) {
        (Ok(_), Err(internal_err)) => {
            warn!("external parser didn't report an error");
            Err(internal_err)
        }
        (Err(_), Err(internal_err)) => Err(internal_err),
        (Err(external_err), Ok(_)) => {
            warn!("internal parser didn't report an error");
            Err(external_err)
        }
        (Ok(external_out), Ok(internal_out)) => {
            if external_out == internal_out {
                Ok(external_out)
            } else {
                Err(SpecParseError::ParserOutputMismatch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that compiles with the internal parser, then tampers with
    /// the schemas so dual mode can observe a divergence.
    struct Tampering;

    impl SpecParser for Tampering {
        fn compile(
            &self,
            spec: &str,
            includes: &BTreeMap<String, String>,
            work_dir: Option<&Path>,
        ) -> SpecParseResult<CompileOutput> {
            let mut out = InternalParser::new().compile(spec, includes, work_dir)?;
            for docs in out.schemas.values_mut() {
                for doc in docs.values_mut() {
                    doc.push(' ');
                }
            }
            Ok(out)
        }
    }

    struct Faithful;

    impl SpecParser for Faithful {
        fn compile(
            &self,
            spec: &str,
            includes: &BTreeMap<String, String>,
            work_dir: Option<&Path>,
        ) -> SpecParseResult<CompileOutput> {
            InternalParser::new().compile(spec, includes, work_dir)
        }
    }

    #[test]
    fn test_dual_agreement() {
        let spec = "module KB {\n typedef int T;\n};\n";
        let out = compile_dual(
            &Faithful,
            &InternalParser::new(),
            spec,
            &BTreeMap::new(),
            None,
        )
        .unwrap();
        assert_eq!(out.services.len(), 1);
    }

    #[test]
    fn test_dual_divergence_fails() {
        let spec = "module KB {\n typedef int T;\n};\n";
        let err = compile_dual(
            &Tampering,
            &InternalParser::new(),
            spec,
            &BTreeMap::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, SpecParseError::ParserOutputMismatch);
    }
}
