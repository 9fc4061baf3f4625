use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::image::CodeImage;
use crate::isa::{is_call_and_link, return_address};
use crate::model::{FunctionTable, SplitOutcome};

/// Every address control returns to after a `jal`/`jalr` in the image.
pub fn scan_call_targets(image: &CodeImage) -> BTreeSet<u32> {
    let mut targets = BTreeSet::new();
    for region in image.regions() {
        for (address, word) in region.words() {
            if is_call_and_link(word) {
                if let Some(target) = return_address(address) {
                    targets.insert(target);
                }
            }
        }
    }
    log::info!("found {} unique call return addresses", targets.len());
    targets
}

/// Call targets classified against the current table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTargetPlan {
    /// Targets that already start an entry.
    pub existing: usize,
    /// Targets inside an entry that need a split.
    pub missing: Vec<u32>,
    /// Targets outside every entry; the table cannot represent them.
    pub outside: Vec<u32>,
}

pub fn plan_call_targets(table: &FunctionTable, targets: &BTreeSet<u32>) -> CallTargetPlan {
    let mut plan = CallTargetPlan::default();
    for &target in targets {
        if table.is_entry_point(target) {
            plan.existing += 1;
        } else if table.find_containing(target).is_some() {
            plan.missing.push(target);
        } else {
            plan.outside.push(target);
        }
    }
    plan
}

/// Split the table at every missing target. Returns the addresses split.
pub fn apply_call_targets(table: &mut FunctionTable, targets: &BTreeSet<u32>) -> Vec<u32> {
    let mut applied = Vec::new();
    for &target in targets {
        match table.split(target) {
            Ok(SplitOutcome::Split { .. }) => applied.push(target),
            Ok(SplitOutcome::AlreadyExists(_)) => {}
            Err(err) => log::debug!("skipping call target: {err}"),
        }
    }
    log::info!("applied {} call-target split(s)", applied.len());
    applied
}
