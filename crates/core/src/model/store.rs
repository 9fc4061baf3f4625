use std::fs;
use std::path::{Path, PathBuf};

use super::table::{FunctionTable, TableError};

/// On-disk encoding of a table, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Json,
    Yaml,
}

impl TableFormat {
    /// `.yaml` / `.yml` select YAML; anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "yaml" || ext == "yml" => TableFormat::Yaml,
            _ => TableFormat::Json,
        }
    }
}

impl FunctionTable {
    /// Canonical text form: records in ascending address order.
    pub fn to_text(&self, format: TableFormat) -> Result<String, TableError> {
        Ok(match format {
            TableFormat::Json => serde_json::to_string_pretty(self)?,
            TableFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }

    /// Parse a table from text. Record order on input does not matter.
    pub fn from_text(text: &str, format: TableFormat) -> Result<Self, TableError> {
        Ok(match format {
            TableFormat::Json => serde_json::from_str(text)?,
            TableFormat::Yaml => serde_yaml::from_str(text)?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| TableError::Io { path: path.to_path_buf(), source })?;
        let table = Self::from_text(&text, TableFormat::from_path(path))?;
        log::debug!("loaded {} entries from {}", table.len(), path.display());
        Ok(table)
    }

    /// Write via a sibling temporary file renamed over `path`.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let path = path.as_ref();
        let mut text = self.to_text(TableFormat::from_path(path))?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        let tmp = tmp_path(path);
        fs::write(&tmp, text).map_err(|source| TableError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, path)
            .map_err(|source| TableError::Io { path: path.to_path_buf(), source })?;
        log::debug!("stored {} entries to {}", self.len(), path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Destination the repair loop persists the table to after every mutation.
pub trait TableSink {
    fn persist(&mut self, table: &FunctionTable) -> Result<(), TableError>;
}

/// Table persisted to a file on disk.
#[derive(Debug, Clone)]
pub struct TableFile {
    pub path: PathBuf,
}

impl TableFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<FunctionTable, TableError> {
        FunctionTable::load(&self.path)
    }
}

impl TableSink for TableFile {
    fn persist(&mut self, table: &FunctionTable) -> Result<(), TableError> {
        table.store(&self.path)
    }
}

/// Keeps every persisted snapshot in memory; useful for dry runs and tests.
impl TableSink for Vec<FunctionTable> {
    fn persist(&mut self, table: &FunctionTable) -> Result<(), TableError> {
        self.push(table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(TableFormat::from_path(Path::new("f.json")), TableFormat::Json);
        assert_eq!(TableFormat::from_path(Path::new("f.YML")), TableFormat::Yaml);
        assert_eq!(TableFormat::from_path(Path::new("functions")), TableFormat::Json);
    }

    #[test]
    fn tmp_path_is_a_sibling() {
        assert_eq!(tmp_path(Path::new("/a/b/t.json")), PathBuf::from("/a/b/t.json.tmp"));
    }
}
