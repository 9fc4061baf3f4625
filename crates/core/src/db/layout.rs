use std::path::{Path, PathBuf};

/// Logical layout of a project on disk.
///
/// Derived from a chosen root path. It does *not* perform any IO itself; the
/// CLI creates directories and files based on it.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Root directory of the project.
    pub root: PathBuf,
    /// Directory for internal metadata (.entryfix).
    pub meta_dir: PathBuf,
    /// Path to the project config file (JSON).
    pub project_config_path: PathBuf,
    /// Path to the project database file.
    pub db_path: PathBuf,
}

impl ProjectLayout {
    /// Compute the default layout for a project rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".entryfix");
        let project_config_path = meta_dir.join("project.json");
        let db_path = meta_dir.join("project.db");

        Self { root, meta_dir, project_config_path, db_path }
    }

    /// Database path string suitable for storing in `ProjectConfig`, relative
    /// to `root` when possible.
    pub fn db_path_relative_string(&self) -> String {
        match self.db_path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => self.db_path.to_string_lossy().to_string(),
        }
    }

    /// Resolve a configured path: absolute paths are kept, relative ones are
    /// joined onto the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
