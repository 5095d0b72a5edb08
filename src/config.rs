//! Registry configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::parser::ParserSource;

fn default_max_deadlock_wait_ms() -> u64 {
    120_000
}

/// Options recognized by the registry core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TypeDbConfig {
    /// Parent directory for parser scratch space. Defaults to the current
    /// directory.
    pub temp_dir: Option<PathBuf>,

    /// Which compiler backend to use. `both` runs the external and internal
    /// backends side by side and requires equal output.
    pub parser_source: ParserSource,

    /// Total lock wait before suspecting a deadlock.
    pub max_deadlock_wait_ms: u64,
}

impl Default for TypeDbConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            parser_source: ParserSource::Internal,
            max_deadlock_wait_ms: default_max_deadlock_wait_ms(),
        }
    }
}

impl TypeDbConfig {
    pub fn max_deadlock_wait(&self) -> Duration {
        Duration::from_millis(self.max_deadlock_wait_ms)
    }
}
