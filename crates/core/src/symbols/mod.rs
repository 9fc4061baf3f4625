//! Initial tables from a symbol source.
//!
//! Symbol sources give start addresses only; sizes are derived by filling up to
//! the next symbol, which yields a gapless table by construction.

use std::collections::BTreeMap;

use goblin::elf::Elf;
use regex::Regex;
use thiserror::Error;

use crate::model::{FunctionEntry, FunctionTable, TableError};

/// Size given to the final symbol, which has no successor to measure against.
pub const DEFAULT_LAST_SIZE: u32 = 0x100;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("Failed to parse ELF symbols: {0}")]
    Elf(#[from] goblin::error::Error),

    #[error("No function symbols found")]
    Empty,

    #[error("Invalid symbol line pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

const SYMBOL_LINE_PATTERN: &str = r"^(\w+)\s*=\s*0[xX]([0-9A-Fa-f]+)\s*;\s*//.*\btype:func\b";

/// Parse `Name = 0xADDR; // type:func` lines; everything else is ignored.
pub fn parse_symbol_addrs(text: &str) -> Result<Vec<(String, u32)>, SymbolError> {
    let pattern = Regex::new(SYMBOL_LINE_PATTERN)?;
    let symbols = text
        .lines()
        .filter_map(|line| {
            let caps = pattern.captures(line.trim())?;
            let address = u32::from_str_radix(&caps[2], 16).ok()?;
            Some((caps[1].to_string(), address))
        })
        .collect();
    Ok(symbols)
}

/// Defined function symbols from an ELF symbol table.
pub fn elf_function_symbols(bytes: &[u8]) -> Result<Vec<(String, u32)>, SymbolError> {
    let elf = Elf::parse(bytes)?;
    let symbols = elf
        .syms
        .iter()
        .filter(|sym| sym.is_function() && sym.st_value > 0 && sym.st_shndx != 0)
        .filter_map(|sym| {
            let name = elf.strtab.get_at(sym.st_name)?;
            let address = u32::try_from(sym.st_value).ok()?;
            (!name.is_empty()).then(|| (name.to_string(), address))
        })
        .collect();
    Ok(symbols)
}

/// Build a gapless table: each symbol runs to the next; the last gets `last_size`.
///
/// Duplicate addresses keep the first name seen.
pub fn table_from_symbols(
    symbols: impl IntoIterator<Item = (String, u32)>,
    last_size: u32,
) -> Result<FunctionTable, SymbolError> {
    let mut by_address: BTreeMap<u32, String> = BTreeMap::new();
    for (name, address) in symbols {
        by_address.entry(address).or_insert(name);
    }
    if by_address.is_empty() {
        return Err(SymbolError::Empty);
    }

    let addresses: Vec<u32> = by_address.keys().copied().collect();
    let entries = by_address.into_iter().enumerate().map(|(index, (address, name))| {
        let size = match addresses.get(index + 1) {
            Some(next) => next - address,
            None => last_size,
        };
        FunctionEntry::new(name, address, size)
    });
    let table = FunctionTable::from_entries(entries)?;
    log::info!("built table with {} entries from symbols", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_line_pattern_compiles() {
        assert!(Regex::new(SYMBOL_LINE_PATTERN).is_ok());
        assert!(parse_symbol_addrs("").unwrap().is_empty());
    }

    #[test]
    fn ignores_non_function_lines() {
        let text = "\
            main = 0x100000; // type:func\n\
            gData = 0x200000; // type:s32\n\
            # comment\n\
            helper=0x100010;// type:func size:0x20\n";
        let symbols = parse_symbol_addrs(text).unwrap();
        assert_eq!(
            symbols,
            vec![("main".to_string(), 0x10_0000), ("helper".to_string(), 0x10_0010)]
        );
    }
}
