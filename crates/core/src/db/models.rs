use serde::{Deserialize, Serialize};

/// Record describing one `repair` run for bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairRunRecord {
    /// Row id; `None` until inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub binary: Option<String>,
    pub binary_hash: Option<String>,
    pub table_path: String,
    /// `converged`, `stalled` or `aborted`.
    pub outcome: String,
    /// Human-readable detail for stalled/aborted runs.
    pub detail: Option<String>,
    pub iterations: i64,
    pub splits: i64,
    pub started_at: String,
    pub finished_at: String,
}

/// One oracle invocation within a recorded run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairIterationRecord {
    pub run_id: i64,
    pub iteration: i64,
    /// `ok`, `timeout` or `unresolved_call`.
    pub result: String,
    pub address: Option<u32>,
    pub work_completed: Option<i64>,
    pub split_applied: bool,
}
