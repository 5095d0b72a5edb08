//! Module references: a module name with an optional pinned `versionTime`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A module reference. With no version set it resolves to the latest
/// released version of the module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleDefId {
    pub module_name: String,
    pub version: Option<u64>,
}

impl ModuleDefId {
    /// Reference to the latest released version.
    pub fn latest(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            version: None,
        }
    }

    /// Reference pinned to one committed `versionTime`.
    pub fn at_version(module_name: impl Into<String>, version: u64) -> Self {
        Self {
            module_name: module_name.into(),
            version: Some(version),
        }
    }
}

impl fmt::Display for ModuleDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}-{}", self.module_name, v),
            None => f.write_str(&self.module_name),
        }
    }
}
