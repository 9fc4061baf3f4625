use serde::{Deserialize, Serialize};

use crate::services::{OracleConfig, RepairSettings};

/// Default location of the persisted function table, relative to the project root.
pub const DEFAULT_TABLE_PATH: &str = "functions.json";

/// Database location, typically relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

fn default_table_path() -> String {
    DEFAULT_TABLE_PATH.to_string()
}

/// Serializable configuration describing an entryfix project.
///
/// Lives at `.entryfix/project.json` in the project root. Relative paths are
/// resolved against the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Human-friendly project name.
    pub name: String,
    pub description: Option<String>,
    /// Version of the config format, not of the binary.
    pub config_version: String,
    pub db: DbConfig,
    /// Input image (ELF) the table describes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Persisted function table; `.yaml`/`.yml` selects YAML.
    #[serde(default = "default_table_path")]
    pub table: String,
    /// External recompile-and-run pipeline; required by `repair`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleConfig>,
    #[serde(default)]
    pub repair: RepairSettings,
}

impl ProjectConfig {
    /// Create a new project configuration using the given name and db path.
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(db_path),
            binary: None,
            table: default_table_path(),
            oracle: None,
            repair: RepairSettings::default(),
        }
    }
}
