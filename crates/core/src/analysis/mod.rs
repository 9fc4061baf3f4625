//! Static passes over the code image and the function table.
//!
//! - `calls`: collects every return address of a call-and-link instruction,
//!   i.e. every address that must be a function entry point.
//! - `delay_slots`: moves boundaries that separate a branch from its delay slot.

pub mod calls;
pub mod delay_slots;

pub use calls::{apply_call_targets, plan_call_targets, scan_call_targets, CallTargetPlan};
pub use delay_slots::{
    correct_delay_slots, find_split_delay_slots, DelaySlotError, DelaySlotFix, DelaySlotReport,
    TrailingBranch, DEFAULT_MAX_SWEEPS,
};
