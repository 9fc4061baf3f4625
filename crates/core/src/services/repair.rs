use serde::{Deserialize, Serialize};

use crate::analysis::{
    apply_call_targets, correct_delay_slots, scan_call_targets, DelaySlotReport,
    DEFAULT_MAX_SWEEPS,
};
use crate::image::CodeImage;
use crate::model::{FunctionTable, SplitError, SplitOutcome, TableSink};
use crate::services::oracle::{Oracle, OracleError, OracleReport, OracleResult};

pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_STALL_THRESHOLD: usize = 3;
pub const DEFAULT_LAUNCH_RETRIES: usize = 1;
/// A failed launch is retried at most this many times.
pub const MAX_LAUNCH_RETRIES: usize = 1;

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_stall_threshold() -> usize {
    DEFAULT_STALL_THRESHOLD
}

fn default_launch_retries() -> usize {
    DEFAULT_LAUNCH_RETRIES
}

fn default_max_sweeps() -> usize {
    DEFAULT_MAX_SWEEPS
}

/// Tunables for the repair loop; every field has a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSettings {
    /// Hard cap on oracle invocations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Consecutive invocations without progress before giving up.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: usize,
    /// Extra attempts after an oracle failure before aborting.
    #[serde(default = "default_launch_retries")]
    pub launch_retries: usize,
    #[serde(default = "default_max_sweeps")]
    pub max_delay_slot_sweeps: usize,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            launch_retries: DEFAULT_LAUNCH_RETRIES,
            max_delay_slot_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl RepairSettings {
    /// Clamp out-of-range values: at most one launch retry, and a stall
    /// threshold of at least one so a progressing iteration never stalls.
    pub fn normalized(self) -> Self {
        let mut settings = self;
        if settings.launch_retries > MAX_LAUNCH_RETRIES {
            log::warn!(
                "launch_retries {} exceeds {MAX_LAUNCH_RETRIES}; clamping",
                settings.launch_retries
            );
            settings.launch_retries = MAX_LAUNCH_RETRIES;
        }
        if settings.stall_threshold == 0 {
            log::warn!("stall_threshold 0 would stall on progress; using 1");
            settings.stall_threshold = 1;
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairState {
    Scanning,
    Invoking,
    Applying,
    Converged,
    Stalled,
    Aborted,
}

impl RepairState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RepairState::Converged | RepairState::Stalled | RepairState::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The oracle named an address no entry covers.
    OutsideTable { address: u32 },
    /// The oracle named an address that cannot start an instruction.
    UnalignedAddress { address: u32 },
    IterationCap { iterations: usize },
    OracleUnavailable { message: String },
    Persist { message: String },
    StaticPass { message: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::OutsideTable { address } => {
                write!(f, "address {address:#x} is outside every known function")
            }
            AbortReason::UnalignedAddress { address } => {
                write!(f, "address {address:#x} is not instruction-aligned")
            }
            AbortReason::IterationCap { iterations } => {
                write!(f, "iteration cap of {iterations} reached")
            }
            AbortReason::OracleUnavailable { message } => write!(f, "oracle failed: {message}"),
            AbortReason::Persist { message } => write!(f, "failed to persist table: {message}"),
            AbortReason::StaticPass { message } => write!(f, "static pass failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    Converged,
    Stalled {
        /// Last address the oracle reported.
        address: Option<u32>,
        work_completed: Option<u64>,
    },
    Aborted(AbortReason),
}

impl RepairOutcome {
    pub fn state(&self) -> RepairState {
        match self {
            RepairOutcome::Converged => RepairState::Converged,
            RepairOutcome::Stalled { .. } => RepairState::Stalled,
            RepairOutcome::Aborted(_) => RepairState::Aborted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairOutcome::Converged => "converged",
            RepairOutcome::Stalled { .. } => "stalled",
            RepairOutcome::Aborted(_) => "aborted",
        }
    }
}

/// One oracle invocation and what the loop did with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based.
    pub iteration: usize,
    pub result: OracleResult,
    pub work_completed: Option<u64>,
    pub split_applied: bool,
}

/// Changes made by the static passes before the first invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPassSummary {
    pub call_target_splits: Vec<u32>,
    pub delay_slots: DelaySlotReport,
}

impl StaticPassSummary {
    pub fn changed(&self) -> bool {
        !self.call_target_splits.is_empty() || !self.delay_slots.fixes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub outcome: RepairOutcome,
    pub iterations: Vec<IterationRecord>,
    /// Addresses split in response to the oracle, in order.
    pub splits: Vec<u32>,
    pub static_pass: Option<StaticPassSummary>,
}

/// What a single dry-run invocation found, without touching the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPreview {
    pub static_pass: Option<StaticPassSummary>,
    pub report: OracleReport,
    /// The split the loop would make for an unresolved call.
    pub split: Option<Result<SplitOutcome, SplitError>>,
}

/// Loop position; `Applying` carries the unresolved call being acted on.
#[derive(Debug)]
enum Phase {
    Scanning,
    Invoking,
    Applying { address: u32, work_completed: Option<u64> },
    Done(RepairState),
}

impl Phase {
    fn state(&self) -> RepairState {
        match self {
            Phase::Scanning => RepairState::Scanning,
            Phase::Invoking => RepairState::Invoking,
            Phase::Applying { .. } => RepairState::Applying,
            Phase::Done(state) => *state,
        }
    }
}

/// Consecutive no-progress counter.
#[derive(Debug, Default)]
struct StallTracker {
    last_work: Option<u64>,
    stale: usize,
}

impl StallTracker {
    /// Record one iteration; returns the current no-progress streak.
    fn observe(&mut self, work: Option<u64>, split_applied: bool) -> usize {
        let progressed = match (work, self.last_work) {
            (Some(now), Some(before)) => now != before,
            _ => split_applied,
        };
        if work.is_some() {
            self.last_work = work;
        }
        self.stale = if progressed { 0 } else { self.stale + 1 };
        self.stale
    }
}

/// Drives the oracle until the table stops producing unresolved calls.
pub struct RepairLoop<'a> {
    settings: RepairSettings,
    /// Enables the static passes before the first invocation.
    pub image: Option<&'a CodeImage>,
}

impl<'a> RepairLoop<'a> {
    pub fn new(settings: RepairSettings) -> Self {
        Self { settings: settings.normalized(), image: None }
    }

    pub fn settings(&self) -> RepairSettings {
        self.settings
    }

    pub fn with_image(mut self, image: &'a CodeImage) -> Self {
        self.image = Some(image);
        self
    }

    fn static_pass(
        &self,
        image: &CodeImage,
        table: &mut FunctionTable,
    ) -> Result<StaticPassSummary, String> {
        let targets = scan_call_targets(image);
        let call_target_splits = apply_call_targets(table, &targets);
        let delay_slots = correct_delay_slots(table, image, self.settings.max_delay_slot_sweeps)
            .map_err(|err| err.to_string())?;
        Ok(StaticPassSummary { call_target_splits, delay_slots })
    }

    fn invoke(&self, oracle: &mut dyn Oracle) -> Result<OracleReport, OracleError> {
        let mut attempt = 0;
        loop {
            match oracle.invoke() {
                Ok(report) => return Ok(report),
                Err(err) if attempt < self.settings.launch_retries => {
                    attempt += 1;
                    log::warn!(
                        "{} oracle failed ({err}); retrying ({attempt}/{})",
                        oracle.name(),
                        self.settings.launch_retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run to a terminal state, persisting through `sink` after every mutation.
    pub fn run(
        &self,
        table: &mut FunctionTable,
        oracle: &mut dyn Oracle,
        sink: &mut dyn TableSink,
    ) -> RepairReport {
        let mut report = RepairReport {
            outcome: RepairOutcome::Converged,
            iterations: Vec::new(),
            splits: Vec::new(),
            static_pass: None,
        };
        let mut stall = StallTracker::default();
        let mut static_done = self.image.is_none();
        let mut phase = Phase::Scanning;

        loop {
            let current = phase.state();
            let next = match phase {
                Phase::Done(_) => break,
                Phase::Scanning => {
                    if !static_done {
                        static_done = true;
                        if let Some(image) = self.image {
                            if let Err(reason) = self.run_static_pass(image, table, sink, &mut report)
                            {
                                report.outcome = RepairOutcome::Aborted(reason);
                                break;
                            }
                        }
                    }
                    if report.iterations.len() >= self.settings.max_iterations {
                        report.outcome = RepairOutcome::Aborted(AbortReason::IterationCap {
                            iterations: report.iterations.len(),
                        });
                        Phase::Done(RepairState::Aborted)
                    } else {
                        Phase::Invoking
                    }
                }
                Phase::Invoking => match self.invoke(oracle) {
                    Err(err) => {
                        report.outcome = RepairOutcome::Aborted(AbortReason::OracleUnavailable {
                            message: err.to_string(),
                        });
                        Phase::Done(RepairState::Aborted)
                    }
                    Ok(oracle_report) => {
                        let iteration = report.iterations.len() + 1;
                        log::info!("iteration {iteration}: {}", oracle_report.result);
                        report.iterations.push(IterationRecord {
                            iteration,
                            result: oracle_report.result,
                            work_completed: oracle_report.work_completed,
                            split_applied: false,
                        });
                        match oracle_report.result {
                            OracleResult::Ok | OracleResult::Timeout => {
                                report.outcome = RepairOutcome::Converged;
                                Phase::Done(RepairState::Converged)
                            }
                            OracleResult::UnresolvedCall(address) => Phase::Applying {
                                address,
                                work_completed: oracle_report.work_completed,
                            },
                        }
                    }
                },
                Phase::Applying { address, work_completed } => {
                    self.apply(address, work_completed, table, sink, &mut stall, &mut report)
                }
            };
            log::debug!("repair: {current:?} -> {:?}", next.state());
            phase = next;
        }

        log::info!(
            "repair finished: {} after {} iteration(s), {} split(s)",
            report.outcome.as_str(),
            report.iterations.len(),
            report.splits.len()
        );
        report
    }

    fn run_static_pass(
        &self,
        image: &CodeImage,
        table: &mut FunctionTable,
        sink: &mut dyn TableSink,
        report: &mut RepairReport,
    ) -> Result<(), AbortReason> {
        let summary =
            self.static_pass(image, table).map_err(|message| AbortReason::StaticPass { message })?;
        let changed = summary.changed();
        report.static_pass = Some(summary);
        if changed {
            sink.persist(table)
                .map_err(|err| AbortReason::Persist { message: err.to_string() })?;
        }
        Ok(())
    }

    fn apply(
        &self,
        address: u32,
        work_completed: Option<u64>,
        table: &mut FunctionTable,
        sink: &mut dyn TableSink,
        stall: &mut StallTracker,
        report: &mut RepairReport,
    ) -> Phase {
        let outcome = match table.split(address) {
            Ok(outcome) => outcome,
            Err(SplitError::NoContainingEntry { address }) => {
                report.outcome = RepairOutcome::Aborted(AbortReason::OutsideTable { address });
                return Phase::Done(RepairState::Aborted);
            }
            Err(SplitError::Unaligned { address }) => {
                report.outcome = RepairOutcome::Aborted(AbortReason::UnalignedAddress { address });
                return Phase::Done(RepairState::Aborted);
            }
        };
        let split_applied = outcome.is_split();
        if split_applied {
            if let Some(last) = report.iterations.last_mut() {
                last.split_applied = true;
            }
            report.splits.push(address);
            if let Err(err) = sink.persist(table) {
                report.outcome =
                    RepairOutcome::Aborted(AbortReason::Persist { message: err.to_string() });
                return Phase::Done(RepairState::Aborted);
            }
        }
        let stale = stall.observe(work_completed, split_applied);
        if stale >= self.settings.stall_threshold {
            log::warn!("no progress in {stale} consecutive iteration(s) at {address:#x}");
            report.outcome = RepairOutcome::Stalled {
                address: Some(address),
                work_completed,
            };
            Phase::Done(RepairState::Stalled)
        } else {
            Phase::Scanning
        }
    }

    /// One invocation against the table as persisted; nothing is modified.
    pub fn preview(
        &self,
        table: &FunctionTable,
        oracle: &mut dyn Oracle,
    ) -> Result<RepairPreview, OracleError> {
        let static_pass = match self.image {
            Some(image) => {
                let mut scratch = table.clone();
                self.static_pass(image, &mut scratch)
                    .map_err(|message| log::warn!("static pass preview failed: {message}"))
                    .ok()
            }
            None => None,
        };
        let report = self.invoke(oracle)?;
        let split = report.result.address().map(|address| table.clone().split(address));
        Ok(RepairPreview { static_pass, report, split })
    }
}
