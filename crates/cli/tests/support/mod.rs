//! Shared project fixtures for CLI tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use entryfix_core::db::{ProjectConfig, ProjectLayout};
use entryfix_core::isa::encode;
use entryfix_core::services::{
    CommandSpec, Oracle, OracleConfig, OracleError, OracleReport, OracleResult,
};

/// Little-endian ELF32 MIPS executable with one PT_LOAD segment.
pub fn mips_elf(vaddr: u32, words: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; 52 + 32];
    out[..4].copy_from_slice(b"\x7fELF");
    out[4] = 1;
    out[5] = 1;
    out[6] = 1;
    out[16..18].copy_from_slice(&2u16.to_le_bytes());
    out[18..20].copy_from_slice(&8u16.to_le_bytes());
    out[20..24].copy_from_slice(&1u32.to_le_bytes());
    out[24..28].copy_from_slice(&vaddr.to_le_bytes());
    out[28..32].copy_from_slice(&52u32.to_le_bytes());
    out[40..42].copy_from_slice(&52u16.to_le_bytes());
    out[42..44].copy_from_slice(&32u16.to_le_bytes());
    out[44..46].copy_from_slice(&1u16.to_le_bytes());
    out[46..48].copy_from_slice(&40u16.to_le_bytes());

    let filesz = (words.len() * 4) as u32;
    let phdr = [1, 84, vaddr, vaddr, filesz, filesz, 5, 4];
    for (index, field) in phdr.iter().enumerate() {
        let at = 52 + index * 4;
        out[at..at + 4].copy_from_slice(&field.to_le_bytes());
    }
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}

/// `nop; jal 0x1000; nop; ...` loaded at 0x1000: one call returning to 0x100c.
pub fn call_image() -> Vec<u8> {
    let mut words = vec![encode::NOP; 8];
    words[1] = encode::jal(0x1000);
    mips_elf(0x1000, &words)
}

pub fn write_symbols(root: &Path, lines: &[&str]) {
    fs::write(root.join("symbols.txt"), lines.join("\n")).expect("write symbols");
}

/// Point the project's oracle at `sh oracle.sh` with the given script body.
pub fn configure_oracle(root: &Path, script: &str) {
    fs::write(root.join("oracle.sh"), script).expect("write oracle script");
    let layout = ProjectLayout::new(root);
    let text = fs::read_to_string(&layout.project_config_path).expect("read config");
    let mut config: ProjectConfig = serde_json::from_str(&text).expect("parse config");
    let mut oracle = OracleConfig::new(CommandSpec::new("sh").arg("oracle.sh"));
    oracle.timeout_seconds = 5;
    config.oracle = Some(oracle);
    fs::write(&layout.project_config_path, serde_json::to_string_pretty(&config).unwrap())
        .expect("write config");
}

pub fn table_json(root: &Path) -> serde_json::Value {
    let text = fs::read_to_string(root.join("functions.json")).expect("read table");
    serde_json::from_str(&text).expect("parse table")
}

/// Replays a fixed sequence of reports; the last one repeats once exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    reports: Vec<OracleReport>,
    cursor: usize,
}

impl ScriptedOracle {
    pub fn new(reports: impl IntoIterator<Item = OracleReport>) -> Self {
        Self { reports: reports.into_iter().collect(), cursor: 0 }
    }

    pub fn invocations(&self) -> usize {
        self.cursor
    }
}

impl Oracle for ScriptedOracle {
    fn invoke(&mut self) -> Result<OracleReport, OracleError> {
        let index = self.cursor.min(self.reports.len().saturating_sub(1));
        self.cursor += 1;
        Ok(self.reports.get(index).copied().unwrap_or(OracleReport::new(OracleResult::Ok)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
