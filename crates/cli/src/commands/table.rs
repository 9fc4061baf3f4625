use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use entryfix_core::model::{FunctionTable, SplitOutcome};
use entryfix_core::symbols::{elf_function_symbols, parse_symbol_addrs, table_from_symbols};

use crate::commands::util::{describe_entry, open_context};
use crate::parse_address;

/// Where initial entry points come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SymbolFormat {
    /// ELF when the file starts with the ELF magic, symbol list otherwise.
    Auto,
    /// Function symbols from an ELF symbol table.
    Elf,
    /// Lines of `Name = 0xADDR; // type:func`.
    SymbolAddrs,
}

fn read_symbols(path: &Path, format: SymbolFormat) -> Result<Vec<(String, u32)>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read symbols at {}", path.display()))?;
    let format = match format {
        SymbolFormat::Auto if bytes.starts_with(b"\x7fELF") => SymbolFormat::Elf,
        SymbolFormat::Auto => SymbolFormat::SymbolAddrs,
        other => other,
    };
    match format {
        SymbolFormat::Elf => elf_function_symbols(&bytes)
            .with_context(|| format!("Failed to read ELF symbols from {}", path.display())),
        _ => parse_symbol_addrs(&String::from_utf8_lossy(&bytes))
            .with_context(|| format!("Failed to read symbols from {}", path.display())),
    }
}

/// Build the project's table from a symbol source.
pub fn import_symbols_command(
    root: &str,
    source: &str,
    format: SymbolFormat,
    last_size: u32,
    force: bool,
) -> Result<()> {
    let ctx = open_context(root)?;
    let table_path = ctx.table_path();
    if table_path.exists() && !force {
        bail!("Table already exists at {}; pass --force to replace it", table_path.display());
    }

    let source_path = ctx.layout.resolve(source);
    let symbols = read_symbols(&source_path, format)?;
    let table = table_from_symbols(symbols, last_size)
        .with_context(|| format!("Failed to build table from {}", source_path.display()))?;
    table
        .store(&table_path)
        .with_context(|| format!("Failed to write table at {}", table_path.display()))?;

    println!("Imported {} function(s) from {}", table.len(), source_path.display());
    if let Some((start, end)) = table.span() {
        println!("  Span: {start:#x}..{end:#x}");
    }
    println!("  Table: {}", table_path.display());
    Ok(())
}

/// Make `address` an entry point and persist.
pub fn add_entry_command(root: &str, address: &str) -> Result<()> {
    let address = parse_address(address)?;
    let ctx = open_context(root)?;
    let mut table = ctx.load_table()?;

    match table.split(address).map_err(|err| anyhow!(err))? {
        SplitOutcome::AlreadyExists(entry) => {
            println!("Entry point already exists: {}", describe_entry(&entry));
        }
        SplitOutcome::Split { left, right } => {
            let path = ctx.table_path();
            table
                .store(&path)
                .with_context(|| format!("Failed to write table at {}", path.display()))?;
            println!("Split:");
            println!("  {}", describe_entry(&left));
            println!("  {}", describe_entry(&right));
        }
    }
    Ok(())
}

/// Print the entry containing `address`.
pub fn lookup_command(root: &str, address: &str, json: bool) -> Result<()> {
    let address = parse_address(address)?;
    let ctx = open_context(root)?;
    let table = ctx.load_table()?;
    let entry = table
        .find_containing(address)
        .ok_or_else(|| anyhow!("No function contains address {address:#x}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        println!("{}", describe_entry(entry));
        if entry.address != address {
            println!("  (+{:#x} into the function)", address - entry.address);
        }
    }
    Ok(())
}

/// Check the table's invariants; fails on the first gap or overlap.
pub fn validate_command(root: &str) -> Result<FunctionTable> {
    let ctx = open_context(root)?;
    let table = ctx.load_table()?;
    table.validate().with_context(|| format!("Table at {} is invalid", ctx.table_path().display()))?;

    println!("Table OK: {} entr(ies)", table.len());
    match table.span() {
        Some((start, end)) => println!("  Span: {start:#x}..{end:#x} (gapless)"),
        None => println!("  (empty)"),
    }
    Ok(table)
}
