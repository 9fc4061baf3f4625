//! Read-only view of the loadable bytes of an ELF image.
//!
//! Only `PT_LOAD` segments are kept, and only their file-backed portion
//! (`p_filesz`); zero-fill beyond that is never code.

use std::fs;
use std::path::{Path, PathBuf};

use goblin::container::Ctx;
use goblin::elf::header::{self, EI_DATA, ELFDATA2LSB, ELFMAG, EM_MIPS, SELFMAG};
use goblin::elf::program_header::{ProgramHeader, PT_LOAD};
use goblin::elf::Elf;
use thiserror::Error;

use crate::isa::INSTRUCTION_WIDTH;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to read image at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Format error: {0}")]
    Format(String),
    #[error("Truncated image: {0}")]
    Truncated(String),
}

/// One loadable region: bytes copied from the file, mapped at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    pub bytes: Vec<u8>,
}

impl Region {
    pub fn new(base: u32, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    /// Build a region from little-endian instruction words.
    pub fn from_words(base: u32, words: &[u32]) -> Self {
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self { base, bytes }
    }

    /// Exclusive end address (may exceed `u32::MAX` by the region length).
    pub fn end(&self) -> u64 {
        u64::from(self.base) + self.bytes.len() as u64
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && u64::from(address) < self.end()
    }

    /// The word at `address`, if all four bytes lie inside this region.
    pub fn word_at(&self, address: u32) -> Option<u32> {
        if !self.contains(address) {
            return None;
        }
        let offset = (address - self.base) as usize;
        let bytes = self.bytes.get(offset..offset + INSTRUCTION_WIDTH as usize)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Every whole word in the region, in 4-byte strides from `base`.
    pub fn words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.bytes.chunks_exact(INSTRUCTION_WIDTH as usize).enumerate().filter_map(
            move |(index, chunk)| {
                let offset = u32::try_from(index).ok()?.checked_mul(INSTRUCTION_WIDTH)?;
                let address = self.base.checked_add(offset)?;
                Some((address, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
            },
        )
    }
}

/// Immutable, addressable copy of the binary's loadable regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeImage {
    regions: Vec<Region>,
}

impl CodeImage {
    /// Load and parse the image at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|source| ImageError::Io { path: path.to_path_buf(), source })?;
        let image = Self::parse(&bytes)?;
        log::info!(
            "loaded {} loadable region(s) from {} ({} bytes of code)",
            image.regions.len(),
            path.display(),
            image.regions.iter().map(|r| r.bytes.len()).sum::<usize>()
        );
        Ok(image)
    }

    /// Parse an in-memory ELF file. No partial image is produced on error.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < SELFMAG || &bytes[..SELFMAG] != ELFMAG {
            return Err(ImageError::Format("missing ELF magic".into()));
        }
        let header = Elf::parse_header(bytes)
            .map_err(|e| ImageError::Format(format!("invalid ELF header: {e}")))?;
        if header.e_ident[EI_DATA] != ELFDATA2LSB {
            return Err(ImageError::Format("only little-endian images are supported".into()));
        }
        if header.e_machine != EM_MIPS {
            log::warn!(
                "image machine is {} (expected MIPS); continuing",
                header::machine_to_str(header.e_machine)
            );
        }
        let container =
            header.container().map_err(|e| ImageError::Format(format!("invalid class: {e}")))?;
        let endian = header
            .endianness()
            .map_err(|e| ImageError::Format(format!("invalid data encoding: {e}")))?;
        let ctx = Ctx::new(container, endian);

        let phoff = header.e_phoff;
        let phentsize = u64::from(header.e_phentsize);
        let phnum = u64::from(header.e_phnum);
        let table_end = phoff.checked_add(phentsize.saturating_mul(phnum));
        if table_end.map_or(true, |end| end > bytes.len() as u64) {
            return Err(ImageError::Truncated(format!(
                "program header table at {phoff:#x} ({phnum} x {phentsize} bytes) exceeds file size {:#x}",
                bytes.len()
            )));
        }

        let mut regions = Vec::new();
        for index in 0..phnum {
            let offset = (phoff + index * phentsize) as usize;
            let phdr = ProgramHeader::parse(bytes, offset, 1, ctx)
                .map_err(|e| ImageError::Truncated(format!("program header {index}: {e}")))?
                .into_iter()
                .next()
                .ok_or_else(|| ImageError::Truncated(format!("program header {index} missing")))?;
            if phdr.p_type != PT_LOAD {
                continue;
            }
            regions.push(load_region(bytes, index, &phdr)?);
        }

        Ok(Self::from_regions(regions))
    }

    /// Build an image directly from regions (sorted by base address).
    pub fn from_regions(mut regions: Vec<Region>) -> Self {
        regions.sort_by_key(|r| r.base);
        Self { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Little-endian word at `address`, if some region holds all four bytes.
    pub fn read_word(&self, address: u32) -> Option<u32> {
        self.regions.iter().find_map(|region| region.word_at(address))
    }
}

fn load_region(bytes: &[u8], index: u64, phdr: &ProgramHeader) -> Result<Region, ImageError> {
    let base = u32::try_from(phdr.p_vaddr).map_err(|_| {
        ImageError::Format(format!(
            "segment {index} virtual address {:#x} is outside the 32-bit address space",
            phdr.p_vaddr
        ))
    })?;
    let end = phdr.p_offset.checked_add(phdr.p_filesz);
    let Some(end) = end.filter(|end| *end <= bytes.len() as u64) else {
        return Err(ImageError::Truncated(format!(
            "segment {index} file range {:#x}+{:#x} exceeds file size {:#x}",
            phdr.p_offset,
            phdr.p_filesz,
            bytes.len()
        )));
    };
    log::debug!(
        "segment {index}: vaddr {base:#x}, filesz {:#x}, memsz {:#x}",
        phdr.p_filesz,
        phdr.p_memsz
    );
    Ok(Region::new(base, bytes[phdr.p_offset as usize..end as usize].to_vec()))
}
