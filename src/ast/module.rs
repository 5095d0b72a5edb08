//! Compiled spec structure: `Service` → `Module` → components.

use serde::{Deserialize, Serialize};

use crate::ident::Md5Hash;

use super::types::{Funcdef, Typedef};

/// One component of a module body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Typedef(Typedef),
    Funcdef(Funcdef),
}

/// A compiled module: the unit of registration and versioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub components: Vec<Component>,
}

impl Module {
    /// Deterministic JSON form of the whole module AST; its MD5 is the
    /// canonical identity used by the duplicate-save check.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// MD5 over the canonical JSON form.
    pub fn canonical_md5(&self) -> Result<Md5Hash, serde_json::Error> {
        Ok(Md5Hash::digest(self.canonical_json()?.as_bytes()))
    }

    pub fn typedefs(&self) -> impl Iterator<Item = &Typedef> {
        self.components.iter().filter_map(|c| match c {
            Component::Typedef(t) => Some(t),
            Component::Funcdef(_) => None,
        })
    }

    pub fn funcdefs(&self) -> impl Iterator<Item = &Funcdef> {
        self.components.iter().filter_map(|c| match c {
            Component::Funcdef(f) => Some(f),
            Component::Typedef(_) => None,
        })
    }
}

/// A compiled spec document. Valid registry input holds exactly one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub modules: Vec<Module>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Scalar, ScalarKind, Type};

    fn sample_module() -> Module {
        Module {
            name: "KB".into(),
            comment: String::new(),
            components: vec![Component::Typedef(Typedef {
                module: "KB".into(),
                name: "Id".into(),
                comment: String::new(),
                alias_type: Type::Scalar(Scalar::new(ScalarKind::String)),
            })],
        }
    }

    #[test]
    fn test_canonical_md5_is_stable() {
        let module = sample_module();
        let first = module.canonical_md5().unwrap();
        let second = module.canonical_md5().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_md5_tracks_content() {
        let module = sample_module();
        let mut changed = module.clone();
        changed.comment = "now documented".into();
        assert_ne!(
            module.canonical_md5().unwrap(),
            changed.canonical_md5().unwrap()
        );
    }
}
