use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::entry::{FunctionEntry, RawEntry};
use crate::isa::INSTRUCTION_WIDTH;

const ADDRESS_SPACE_END: u64 = 1 << 32;

/// Errors raised while building, validating or persisting a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Entry {name} at {address:#x} (size {size:#x}) is not 4-byte aligned")]
    Unaligned { name: String, address: u32, size: u32 },

    #[error("Entry {name} at {address:#x} extends past the 32-bit address space")]
    OutOfRange { name: String, address: u32 },

    #[error("Duplicate entry address {address:#x} ({first} and {second})")]
    Duplicate { address: u32, first: String, second: String },

    #[error("Entry {second} at {second_address:#x} overlaps {first} ending at {first_end:#x}")]
    Overlap { first: String, first_end: u64, second: String, second_address: u32 },

    #[error("Gap between {first} ending at {end:#x} and {second} at {next:#x}")]
    Gap { first: String, end: u64, second: String, next: u32 },

    #[error("Failed to access table at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse table JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse table YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("No function contains address {address:#x}")]
    NoContainingEntry { address: u32 },

    #[error("Split address {address:#x} is not instruction-aligned")]
    Unaligned { address: u32 },
}

/// Result of a successful `split`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The containing entry was cut in two.
    Split { left: FunctionEntry, right: FunctionEntry },
    /// An entry already starts at the address; nothing changed.
    AlreadyExists(FunctionEntry),
}

impl SplitOutcome {
    pub fn is_split(&self) -> bool {
        matches!(self, SplitOutcome::Split { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdjustError {
    #[error("No entry starts at {address:#x}")]
    NoEntry { address: u32 },

    #[error("Entry {name} at {address:#x} is the last in the table; no following entry to adjust")]
    NoNextEntry { address: u32, name: String },

    #[error("Entry at {address:#x} ends at {end:#x} but the next entry starts at {next:#x}")]
    NotAdjacent { address: u32, end: u64, next: u32 },

    #[error("Boundary delta {delta} is not a multiple of the instruction width")]
    Unaligned { delta: i32 },

    #[error("Delta {delta} would leave entry at {address:#x} with no instructions")]
    EmptyLeft { address: u32, delta: i32 },

    #[error("Delta {delta} moves past the end of entry {name} at {address:#x}")]
    Overrun { address: u32, name: String, delta: i32 },
}

/// What `adjust_boundary` did to the two entries involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryAdjustment {
    pub left: FunctionEntry,
    /// The following entry after the move, or `None` if it shrank to nothing.
    pub next: Option<FunctionEntry>,
    /// The following entry as it was, when it was dropped.
    pub removed: Option<FunctionEntry>,
}

/// Ordered, non-overlapping set of function entries keyed by start address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    entries: BTreeMap<u32, FunctionEntry>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from arbitrary-order entries.
    ///
    /// Zero-size entries are dropped. Unaligned, duplicate or overlapping
    /// entries are rejected. Gaps are allowed here; see [`FunctionTable::validate`].
    pub fn from_entries(
        entries: impl IntoIterator<Item = FunctionEntry>,
    ) -> Result<Self, TableError> {
        let mut sorted: Vec<FunctionEntry> = entries
            .into_iter()
            .filter(|e| {
                if e.size == 0 {
                    log::warn!("dropping zero-size entry {} at {:#x}", e.name, e.address);
                }
                e.size > 0
            })
            .collect();
        sorted.sort_by_key(|e| e.address);

        let mut table = Self::new();
        for entry in sorted {
            if entry.address % INSTRUCTION_WIDTH != 0 || entry.size % INSTRUCTION_WIDTH != 0 {
                return Err(TableError::Unaligned {
                    name: entry.name,
                    address: entry.address,
                    size: entry.size,
                });
            }
            if entry.end() > ADDRESS_SPACE_END {
                return Err(TableError::OutOfRange { name: entry.name, address: entry.address });
            }
            if let Some((_, last)) = table.entries.last_key_value() {
                if last.address == entry.address {
                    return Err(TableError::Duplicate {
                        address: entry.address,
                        first: last.name.clone(),
                        second: entry.name,
                    });
                }
                if last.end() > u64::from(entry.address) {
                    return Err(TableError::Overlap {
                        first: last.name.clone(),
                        first_end: last.end(),
                        second: entry.name,
                        second_address: entry.address,
                    });
                }
            }
            table.entries.insert(entry.address, entry);
        }
        Ok(table)
    }

    /// Placeholder name for an entry point discovered at `address`.
    pub fn fresh_name(address: u32) -> String {
        format!("entry_{address:x}")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<FunctionEntry> {
        self.entries.values().cloned().collect()
    }

    /// The entry starting exactly at `address`.
    pub fn get(&self, address: u32) -> Option<&FunctionEntry> {
        self.entries.get(&address)
    }

    pub fn first(&self) -> Option<&FunctionEntry> {
        self.entries.values().next()
    }

    pub fn last(&self) -> Option<&FunctionEntry> {
        self.entries.values().next_back()
    }

    /// The entry following the one that starts at `address`.
    pub fn next_after(&self, address: u32) -> Option<&FunctionEntry> {
        self.entries.range((Bound::Excluded(address), Bound::Unbounded)).next().map(|(_, e)| e)
    }

    /// `(lowest start, highest end)` covered by the table.
    pub fn span(&self) -> Option<(u32, u64)> {
        Some((self.first()?.address, self.last()?.end()))
    }

    pub fn is_entry_point(&self, address: u32) -> bool {
        self.entries.contains_key(&address)
    }

    /// The unique entry whose range holds `address`.
    pub fn find_containing(&self, address: u32) -> Option<&FunctionEntry> {
        self.entries
            .range(..=address)
            .next_back()
            .map(|(_, e)| e)
            .filter(|e| e.contains(address))
    }

    /// Make `address` an entry point by cutting its containing entry in two.
    ///
    /// Idempotent: splitting at an existing entry point is a no-op.
    pub fn split(&mut self, address: u32) -> Result<SplitOutcome, SplitError> {
        if address % INSTRUCTION_WIDTH != 0 {
            return Err(SplitError::Unaligned { address });
        }
        let entry =
            self.find_containing(address).cloned().ok_or(SplitError::NoContainingEntry { address })?;
        if entry.address == address {
            log::debug!("entry point {address:#x} already exists ({})", entry.name);
            return Ok(SplitOutcome::AlreadyExists(entry));
        }

        let left = FunctionEntry::new(entry.name.clone(), entry.address, address - entry.address);
        let right = FunctionEntry::new(
            Self::fresh_name(address),
            address,
            (entry.end() - u64::from(address)) as u32,
        );
        log::info!(
            "split {} ({:#x}..{:#x}) at {address:#x}",
            entry.name,
            entry.address,
            entry.end()
        );
        self.entries.insert(left.address, left.clone());
        self.entries.insert(right.address, right.clone());
        Ok(SplitOutcome::Split { left, right })
    }

    /// Grow the entry at `left_address` by `delta` bytes, moving the start of
    /// the following entry by the same amount.
    ///
    /// A following entry left with size zero is removed.
    pub fn adjust_boundary(
        &mut self,
        left_address: u32,
        delta: i32,
    ) -> Result<BoundaryAdjustment, AdjustError> {
        if delta % INSTRUCTION_WIDTH as i32 != 0 {
            return Err(AdjustError::Unaligned { delta });
        }
        let left =
            self.get(left_address).cloned().ok_or(AdjustError::NoEntry { address: left_address })?;
        let next = self.next_after(left_address).cloned().ok_or_else(|| {
            AdjustError::NoNextEntry { address: left_address, name: left.name.clone() }
        })?;
        if left.end() != u64::from(next.address) {
            return Err(AdjustError::NotAdjacent {
                address: left_address,
                end: left.end(),
                next: next.address,
            });
        }

        let new_left_size = i64::from(left.size) + i64::from(delta);
        if new_left_size <= 0 {
            return Err(AdjustError::EmptyLeft { address: left_address, delta });
        }
        let new_next_size = i64::from(next.size) - i64::from(delta);
        if new_next_size < 0 {
            return Err(AdjustError::Overrun { address: next.address, name: next.name, delta });
        }
        let new_next_address = (i64::from(next.address) + i64::from(delta)) as u32;

        self.entries.remove(&next.address);
        let left = FunctionEntry { size: new_left_size as u32, ..left };
        self.entries.insert(left.address, left.clone());

        let (moved, removed) = if new_next_size == 0 {
            log::info!("{} at {:#x} shrank to nothing and was removed", next.name, next.address);
            (None, Some(next))
        } else {
            let moved = FunctionEntry {
                address: new_next_address,
                size: new_next_size as u32,
                ..next
            };
            self.entries.insert(moved.address, moved.clone());
            (Some(moved), None)
        };
        log::debug!("moved boundary after {} by {delta:+} to {:#x}", left.name, left.end());

        Ok(BoundaryAdjustment { left, next: moved, removed })
    }

    /// Check that adjacent entries meet exactly: no gaps, no overlaps.
    pub fn validate(&self) -> Result<(), TableError> {
        let mut iter = self.entries.values();
        let Some(mut prev) = iter.next() else {
            return Ok(());
        };
        for entry in iter {
            let next = u64::from(entry.address);
            if prev.end() < next {
                return Err(TableError::Gap {
                    first: prev.name.clone(),
                    end: prev.end(),
                    second: entry.name.clone(),
                    next: entry.address,
                });
            }
            if prev.end() > next {
                return Err(TableError::Overlap {
                    first: prev.name.clone(),
                    first_end: prev.end(),
                    second: entry.name.clone(),
                    second_address: entry.address,
                });
            }
            prev = entry;
        }
        Ok(())
    }
}

impl Serialize for FunctionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de> Deserialize<'de> for FunctionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<RawEntry>::deserialize(deserializer)?;
        FunctionTable::from_entries(raw.into_iter().filter_map(RawEntry::into_entry))
            .map_err(serde::de::Error::custom)
    }
}
