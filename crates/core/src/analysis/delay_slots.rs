use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::CodeImage;
use crate::isa::{is_delay_slot_branch, INSTRUCTION_WIDTH};
use crate::model::{AdjustError, FunctionEntry, FunctionTable, TableError};

/// Sweeps allowed before the corrector is declared non-convergent.
pub const DEFAULT_MAX_SWEEPS: usize = 16;

#[derive(Debug, Error)]
pub enum DelaySlotError {
    #[error("Table is not gapless: {0}")]
    InvalidTable(#[from] TableError),

    #[error("Delay-slot correction did not converge after {sweeps} sweep(s)")]
    NonConvergent { sweeps: usize },

    #[error("Boundary adjustment failed: {0}")]
    Adjust(#[from] AdjustError),
}

/// One boundary moved forward by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaySlotFix {
    pub function: String,
    pub branch_address: u32,
    pub next_function: String,
    /// The following entry consisted only of the delay slot and was dropped.
    pub removed_next: bool,
}

/// The final entry ends in a branch whose delay slot is outside the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingBranch {
    pub function: String,
    pub branch_address: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaySlotReport {
    pub fixes: Vec<DelaySlotFix>,
    pub sweeps: usize,
    /// Needs manual attention; never corrected automatically.
    pub trailing_branch: Option<TrailingBranch>,
}

fn ends_in_branch(image: &CodeImage, entry: &FunctionEntry) -> Option<u32> {
    let last = entry.last_instruction()?;
    image.read_word(last).filter(|w| is_delay_slot_branch(*w)).map(|_| last)
}

/// Start addresses of entries whose delay slot currently sits in the next entry.
pub fn find_split_delay_slots(table: &FunctionTable, image: &CodeImage) -> Vec<u32> {
    let last = table.last().map(|e| e.address);
    table
        .iter()
        .filter(|e| Some(e.address) != last)
        .filter(|e| ends_in_branch(image, e).is_some())
        .map(|e| e.address)
        .collect()
}

/// Move every boundary that separates a branch from its delay slot.
///
/// Sweeps left to right, re-running while a sweep changed anything, up to
/// `max_sweeps`.
pub fn correct_delay_slots(
    table: &mut FunctionTable,
    image: &CodeImage,
    max_sweeps: usize,
) -> Result<DelaySlotReport, DelaySlotError> {
    table.validate()?;
    let mut report = DelaySlotReport::default();

    for sweep in 1..=max_sweeps {
        report.sweeps = sweep;
        let mut changed = false;
        let mut cursor = table.first().map(|e| e.address);

        while let Some(address) = cursor {
            let Some(entry) = table.get(address).cloned() else {
                break;
            };
            if let Some(branch_address) = ends_in_branch(image, &entry) {
                match table.adjust_boundary(address, INSTRUCTION_WIDTH as i32) {
                    Ok(adjustment) => {
                        let removed = adjustment.removed.is_some();
                        let next_function = adjustment
                            .removed
                            .or(adjustment.next)
                            .map(|e| e.name)
                            .unwrap_or_default();
                        log::info!(
                            "delay slot of {} @ {branch_address:#x} moved out of {next_function}",
                            entry.name
                        );
                        report.fixes.push(DelaySlotFix {
                            function: entry.name.clone(),
                            branch_address,
                            next_function,
                            removed_next: removed,
                        });
                        changed = true;
                    }
                    Err(AdjustError::NoNextEntry { .. }) => {
                        if report.trailing_branch.is_none() {
                            log::warn!(
                                "last entry {} ends in a branch at {branch_address:#x}; \
                                 its delay slot is outside the table",
                                entry.name
                            );
                        }
                        report.trailing_branch =
                            Some(TrailingBranch { function: entry.name.clone(), branch_address });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            cursor = table.next_after(address).map(|e| e.address);
        }

        if !changed {
            table.validate()?;
            return Ok(report);
        }
    }

    Err(DelaySlotError::NonConvergent { sweeps: max_sweeps })
}
