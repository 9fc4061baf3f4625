//! Project layout, configuration and the SQLite database of repair history.
//!
//! - `ProjectLayout`: computed paths under the project root.
//! - `ProjectConfig`: serializable project metadata (`.entryfix/project.json`).
//! - `ProjectDb`: a small SQLite wrapper with versioned migrations.
//! - `ProjectContext`: layout + config + open database, loaded from a root.

mod config;
mod context;
mod layout;
mod models;
mod project_db;
mod util;

pub use config::{DbConfig, ProjectConfig, DEFAULT_TABLE_PATH};
pub use context::ProjectContext;
pub use layout::ProjectLayout;
pub use models::{RepairIterationRecord, RepairRunRecord};
pub use project_db::{DbError, DbResult, ProjectDb, CURRENT_SCHEMA_VERSION};
pub use util::{load_project_config, open_project_db, sha256_file};
