//! Oracle plumbing and the repair loop built on it.

pub mod oracle;
pub mod process;
pub mod repair;
pub mod session;

pub use oracle::{
    CommandSpec, Oracle, OracleConfig, OracleError, OracleReport, OracleResult, OutputMarkers,
    DEFAULT_PROGRESS_PATTERN, DEFAULT_TIMEOUT_SECONDS, DEFAULT_UNRESOLVED_PATTERN,
};
pub use process::ProcessOracle;
pub use repair::{
    AbortReason, IterationRecord, RepairLoop, RepairOutcome, RepairPreview, RepairReport,
    RepairSettings, RepairState, StaticPassSummary, DEFAULT_LAUNCH_RETRIES,
    DEFAULT_MAX_ITERATIONS, DEFAULT_STALL_THRESHOLD, MAX_LAUNCH_RETRIES,
};
pub use session::{RepairOverrides, RepairSession};
