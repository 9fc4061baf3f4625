//! In-test builders: small little-endian ELF32 MIPS images and a scripted oracle.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use entryfix_core::services::{Oracle, OracleError, OracleReport, OracleResult};

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const SHDR_SIZE: usize = 40;
const SYM_SIZE: usize = 16;

pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;

struct Segment {
    kind: u32,
    vaddr: u32,
    bytes: Vec<u8>,
    extra_memsz: u32,
}

#[derive(Default)]
pub struct ElfBuilder {
    machine: u16,
    segments: Vec<Segment>,
    symbols: Vec<(String, u32, bool)>,
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u16(out: &mut [u8], at: usize, v: u16) {
    out[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self { machine: 8, ..Self::default() }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// A loadable segment holding `words` at `vaddr`.
    pub fn load(self, vaddr: u32, words: &[u32]) -> Self {
        self.load_with_bss(vaddr, words, 0)
    }

    /// Loadable segment whose memory size exceeds its file size by `bss`.
    pub fn load_with_bss(mut self, vaddr: u32, words: &[u32], bss: u32) -> Self {
        self.segments.push(Segment {
            kind: PT_LOAD,
            vaddr,
            bytes: words_to_bytes(words),
            extra_memsz: bss,
        });
        self
    }

    /// A non-loadable segment; its bytes must never show up in the image.
    pub fn note(mut self, vaddr: u32, words: &[u32]) -> Self {
        self.segments.push(Segment {
            kind: PT_NOTE,
            vaddr,
            bytes: words_to_bytes(words),
            extra_memsz: 0,
        });
        self
    }

    pub fn function(mut self, name: &str, address: u32) -> Self {
        self.symbols.push((name.to_string(), address, true));
        self
    }

    /// A data symbol, which symbol import must skip.
    pub fn object(mut self, name: &str, address: u32) -> Self {
        self.symbols.push((name.to_string(), address, false));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = EHDR_SIZE;
        let mut out = vec![0u8; EHDR_SIZE + PHDR_SIZE * self.segments.len()];

        // Segment payloads follow the program header table.
        let mut offsets = Vec::new();
        for segment in &self.segments {
            offsets.push(out.len());
            out.extend_from_slice(&segment.bytes);
        }

        let mut section_table = None;
        if !self.symbols.is_empty() {
            section_table = Some(self.append_symbols(&mut out));
        }

        // ELF header.
        out[..4].copy_from_slice(b"\x7fELF");
        out[4] = 1; // ELFCLASS32
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        put_u16(&mut out, 16, 2); // ET_EXEC
        put_u16(&mut out, 18, self.machine);
        put_u32(&mut out, 20, 1);
        put_u32(&mut out, 24, self.segments.first().map_or(0, |s| s.vaddr));
        put_u32(&mut out, 28, phoff as u32);
        put_u16(&mut out, 40, EHDR_SIZE as u16);
        put_u16(&mut out, 42, PHDR_SIZE as u16);
        put_u16(&mut out, 44, self.segments.len() as u16);
        put_u16(&mut out, 46, SHDR_SIZE as u16);
        if let Some((shoff, shnum, shstrndx)) = section_table {
            put_u32(&mut out, 32, shoff as u32);
            put_u16(&mut out, 48, shnum);
            put_u16(&mut out, 50, shstrndx);
        }

        for (index, (segment, offset)) in self.segments.iter().zip(&offsets).enumerate() {
            let at = phoff + index * PHDR_SIZE;
            let filesz = segment.bytes.len() as u32;
            put_u32(&mut out, at, segment.kind);
            put_u32(&mut out, at + 4, *offset as u32);
            put_u32(&mut out, at + 8, segment.vaddr);
            put_u32(&mut out, at + 12, segment.vaddr);
            put_u32(&mut out, at + 16, filesz);
            put_u32(&mut out, at + 20, filesz + segment.extra_memsz);
            put_u32(&mut out, at + 24, 5);
            put_u32(&mut out, at + 28, 4);
        }
        out
    }

    /// Append .symtab/.strtab/.shstrtab and a section header table.
    /// Returns `(shoff, shnum, shstrndx)`.
    fn append_symbols(&self, out: &mut Vec<u8>) -> (usize, u16, u16) {
        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; SYM_SIZE];
        for (name, address, is_function) in &self.symbols {
            let name_offset = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            push_u32(&mut symtab, name_offset);
            push_u32(&mut symtab, *address);
            push_u32(&mut symtab, 0);
            // STB_GLOBAL with STT_FUNC or STT_OBJECT.
            symtab.push(if *is_function { 0x12 } else { 0x11 });
            symtab.push(0);
            push_u16(&mut symtab, 1);
        }
        let shstrtab = b"\0.text\0.symtab\0.strtab\0.shstrtab\0".to_vec();

        while out.len() % 4 != 0 {
            out.push(0);
        }
        let symtab_off = out.len();
        out.extend_from_slice(&symtab);
        let strtab_off = out.len();
        out.extend_from_slice(&strtab);
        let shstrtab_off = out.len();
        out.extend_from_slice(&shstrtab);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        let shoff = out.len();

        let text = self.segments.first();
        let headers: [[u32; 10]; 5] = [
            [0; 10],
            [
                1, // .text
                1,
                6,
                text.map_or(0, |s| s.vaddr),
                EHDR_SIZE as u32 + (PHDR_SIZE * self.segments.len()) as u32,
                text.map_or(0, |s| s.bytes.len() as u32),
                0,
                0,
                4,
                0,
            ],
            [7, 2, 0, 0, symtab_off as u32, symtab.len() as u32, 3, 1, 4, SYM_SIZE as u32],
            [15, 3, 0, 0, strtab_off as u32, strtab.len() as u32, 0, 0, 1, 0],
            [23, 3, 0, 0, shstrtab_off as u32, shstrtab.len() as u32, 0, 0, 1, 0],
        ];
        for header in headers {
            for field in header {
                push_u32(out, field);
            }
        }
        (shoff, 5, 4)
    }
}

pub fn write_elf(dir: &Path, name: &str, builder: &ElfBuilder) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, builder.build()).expect("write elf");
    path
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
