use std::fs;

use anyhow::{bail, Context, Result};
use entryfix_core::db::{ProjectConfig, ProjectDb, ProjectLayout};
use serde::Serialize;

use crate::commands::util::{open_context, print_file_status};
use crate::{canonicalize_or_current, infer_project_name};

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub binary: Option<String>,
    pub table: String,
    pub oracle_configured: bool,
    pub repair: entryfix_core::services::RepairSettings,
    pub table_stats: Option<TableStats>,
    pub repair_runs: usize,
}

#[derive(Serialize)]
pub struct TableStats {
    pub entries: usize,
    pub start: Option<u32>,
    pub end: Option<u64>,
    pub gapless: bool,
}

/// Initialize a new project at `root`.
pub fn init_project_command(
    root: &str,
    name: Option<String>,
    binary: Option<String>,
    table: Option<String>,
) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);

    if layout.project_config_path.exists() {
        bail!("Project already initialized at {}", layout.project_config_path.display());
    }

    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;

    let mut config = ProjectConfig::new(&project_name, layout.db_path_relative_string());
    config.binary = binary;
    if let Some(table) = table {
        config.table = table;
    }

    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config: {}", layout.project_config_path.display())
    })?;

    // Create the database now so follow-on commands can rely on it.
    ProjectDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize project database at {}", layout.db_path.display())
    })?;

    println!("Initialized entryfix project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Table: {}", config.table);
    if let Some(binary) = &config.binary {
        println!("  Binary: {}", binary);
    }

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_context(root)?;
    let table_path = ctx.table_path();

    let table_stats = if table_path.is_file() {
        let table = ctx.load_table()?;
        let span = table.span();
        Some(TableStats {
            entries: table.len(),
            start: span.map(|(start, _)| start),
            end: span.map(|(_, end)| end),
            gapless: table.validate().is_ok(),
        })
    } else {
        None
    };
    let repair_runs = ctx.db.list_repair_runs().context("Failed to list repair runs")?.len();

    let snapshot = ProjectInfoSnapshot {
        name: ctx.config.name.clone(),
        root: ctx.layout.root.display().to_string(),
        config_file: ctx.layout.project_config_path.display().to_string(),
        config_version: ctx.config.config_version.clone(),
        db_path: ctx.db_path.display().to_string(),
        binary: ctx.config.binary.clone(),
        table: ctx.config.table.clone(),
        oracle_configured: ctx.config.oracle.is_some(),
        repair: ctx.config.repair,
        table_stats,
        repair_runs,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("entryfix Project Info");
    println!("=====================");
    println!("Name: {}", snapshot.name);
    println!("Root: {}", snapshot.root);
    println!("Config file: {}", snapshot.config_file);
    println!("Config version: {}", snapshot.config_version);
    println!("DB path: {}", snapshot.db_path);
    println!("Oracle configured: {}", if snapshot.oracle_configured { "yes" } else { "no" });
    println!(
        "Repair: max {} iteration(s), stall after {}, {} retry(ies)",
        snapshot.repair.max_iterations,
        snapshot.repair.stall_threshold,
        snapshot.repair.launch_retries
    );
    println!();

    println!("Files:");
    print_file_status("Table", &table_path);
    if let Some(binary) = ctx.binary_path() {
        print_file_status("Binary", &binary);
    }

    if let Some(stats) = &snapshot.table_stats {
        println!();
        println!("Table: {} entr(ies)", stats.entries);
        if let (Some(start), Some(end)) = (stats.start, stats.end) {
            println!("  Span: {start:#x}..{end:#x}");
        }
        println!("  Gapless: {}", if stats.gapless { "yes" } else { "no" });
    }
    println!("Recorded repair runs: {}", snapshot.repair_runs);

    Ok(())
}
