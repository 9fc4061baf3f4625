use std::path::Path;

use anyhow::Result;
use entryfix_core::db::ProjectContext;
use entryfix_core::model::FunctionEntry;

use crate::canonicalize_or_current;

/// Resolve `root` and load the project context (config + open database).
pub fn open_context(root: &str) -> Result<ProjectContext> {
    let root_path = canonicalize_or_current(root)?;
    ProjectContext::from_root(root_path)
}

/// Helper to print whether a file exists.
pub fn print_file_status(label: &str, path: &Path) {
    let exists = path.is_file();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// One-line rendering of an entry: `name @ 0xstart..0xend (size 0x..)`.
pub fn describe_entry(entry: &FunctionEntry) -> String {
    format!(
        "{} @ {:#010x}..{:#010x} (size {:#x})",
        entry.name,
        entry.address,
        entry.end(),
        entry.size
    )
}

/// Render an optional address for human output.
pub fn format_address(address: Option<u32>) -> String {
    address.map(|a| format!("{a:#x}")).unwrap_or_else(|| "-".to_string())
}
