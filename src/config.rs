//! Manager configuration.
//!
//! An embedding application can describe its module in TOML:
//!
//! ```toml
//! name = "Converters"
//! capability = "run-and-save"
//! output_dir = "target/generated"
//! ```
//!
//! `capability` defaults to `"run-only"`; without `output_dir`, artifacts are
//! written to the process's current working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::module::Capability;

/// Configuration for a [`DynamicModuleManager`](crate::module::DynamicModuleManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Module name, also the artifact base name.
    pub name: String,
    /// Requested capability.
    #[serde(default)]
    pub capability: Capability,
    /// Directory artifacts are saved into. `None` for the current directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl ManagerConfig {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            output_dir: None,
        }
    }

    /// Set the directory artifacts are saved into.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }
}
