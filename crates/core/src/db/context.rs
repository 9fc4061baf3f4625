use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::db::{open_project_db, ProjectConfig, ProjectDb, ProjectLayout};
use crate::image::CodeImage;
use crate::model::{FunctionTable, TableFile};

/// Convenience wrapper bundling layout, config, db path, and an open ProjectDb.
#[derive(Debug)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: ProjectConfig,
    pub db_path: PathBuf,
    pub db: ProjectDb,
}

impl ProjectContext {
    /// Load project config and open the database for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let (config, db_path, db) = open_project_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }

    pub fn table_path(&self) -> PathBuf {
        self.layout.resolve(&self.config.table)
    }

    pub fn table_file(&self) -> TableFile {
        TableFile::new(self.table_path())
    }

    pub fn binary_path(&self) -> Option<PathBuf> {
        self.config.binary.as_ref().map(|b| self.layout.resolve(b))
    }

    pub fn load_table(&self) -> Result<FunctionTable> {
        let path = self.table_path();
        FunctionTable::load(&path)
            .with_context(|| format!("Failed to load function table at {}", path.display()))
    }

    /// The configured image, if any.
    pub fn load_image(&self) -> Result<Option<CodeImage>> {
        let Some(path) = self.binary_path() else {
            return Ok(None);
        };
        let image = CodeImage::load(&path)
            .with_context(|| format!("Failed to load code image at {}", path.display()))?;
        Ok(Some(image))
    }

    /// Like [`ProjectContext::load_image`] but fails when no binary is configured.
    pub fn require_image(&self) -> Result<CodeImage> {
        self.load_image()?.with_context(|| {
            format!(
                "No binary configured in {}; set \"binary\" or re-run init-project --binary",
                self.layout.project_config_path.display()
            )
        })
    }
}
