use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_UNRESOLVED_PATTERN: &str = r"No func at (0x[0-9a-fA-F]+)";
pub const DEFAULT_PROGRESS_PATTERN: &str = r"Total calls: (\d+)";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 20;

/// What one oracle invocation observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum OracleResult {
    /// The program ran to completion without an unresolved call.
    Ok,
    /// The program was still running when the time budget expired.
    Timeout,
    /// The program dispatched a call to an address no function starts at.
    UnresolvedCall(u32),
}

impl OracleResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleResult::Ok => "ok",
            OracleResult::Timeout => "timeout",
            OracleResult::UnresolvedCall(_) => "unresolved_call",
        }
    }

    pub fn address(&self) -> Option<u32> {
        match self {
            OracleResult::UnresolvedCall(address) => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for OracleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleResult::UnresolvedCall(address) => write!(f, "unresolved call to {address:#x}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReport {
    pub result: OracleResult,
    /// Completed-work counter from the run's output, if it printed one.
    pub work_completed: Option<u64>,
}

impl OracleReport {
    pub fn new(result: OracleResult) -> Self {
        Self { result, work_completed: None }
    }

    pub fn with_work(mut self, work_completed: u64) -> Self {
        self.work_completed = Some(work_completed);
        self
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Preparation step `{step}` failed: {detail}")]
    StepFailed { step: String, detail: String },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid output pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// External recompile-and-run pipeline queried for unresolved-call faults.
///
/// Invocations are strictly sequential; each one sees the table as last persisted.
pub trait Oracle {
    fn invoke(&mut self) -> Result<OracleReport, OracleError>;
    fn name(&self) -> &'static str;
}

/// One external command: program, arguments and an optional marker its output
/// must contain for the step to count as successful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_marker: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), success_marker: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = Some(marker.into());
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_unresolved_pattern() -> String {
    DEFAULT_UNRESOLVED_PATTERN.to_string()
}

fn default_progress_pattern() -> String {
    DEFAULT_PROGRESS_PATTERN.to_string()
}

/// How to drive the external pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Run to completion, in order, before every `run`.
    #[serde(default)]
    pub prepare: Vec<CommandSpec>,
    pub run: CommandSpec,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_unresolved_pattern")]
    pub unresolved_pattern: String,
    #[serde(default = "default_progress_pattern")]
    pub progress_pattern: String,
}

impl OracleConfig {
    pub fn new(run: CommandSpec) -> Self {
        Self {
            prepare: Vec::new(),
            run,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            unresolved_pattern: default_unresolved_pattern(),
            progress_pattern: default_progress_pattern(),
        }
    }

    pub fn markers(&self) -> Result<OutputMarkers, OracleError> {
        OutputMarkers::new(&self.unresolved_pattern, &self.progress_pattern)
    }
}

/// Compiled patterns that turn run output into an [`OracleReport`].
#[derive(Debug, Clone)]
pub struct OutputMarkers {
    unresolved: Regex,
    progress: Regex,
}

fn compile(pattern: &str) -> Result<Regex, OracleError> {
    Regex::new(pattern)
        .map_err(|source| OracleError::Pattern { pattern: pattern.to_string(), source })
}

impl OutputMarkers {
    pub fn new(unresolved: &str, progress: &str) -> Result<Self, OracleError> {
        Ok(Self { unresolved: compile(unresolved)?, progress: compile(progress)? })
    }

    pub fn defaults() -> Result<Self, OracleError> {
        Self::new(DEFAULT_UNRESOLVED_PATTERN, DEFAULT_PROGRESS_PATTERN)
    }

    /// Classify captured output.
    ///
    /// The first unresolved-call marker wins; the last progress marker is the
    /// counter. A timed-out run is `Timeout` even if it printed a fault.
    pub fn parse(&self, output: &str, timed_out: bool) -> OracleReport {
        let work_completed = self
            .progress
            .captures_iter(output)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
            .last();

        let result = if timed_out {
            OracleResult::Timeout
        } else {
            self.unresolved
                .captures_iter(output)
                .find_map(|caps| parse_hex(caps.get(1)?.as_str()))
                .map(OracleResult::UnresolvedCall)
                .unwrap_or(OracleResult::Ok)
        };

        OracleReport { result, work_completed }
    }
}

fn parse_hex(text: &str) -> Option<u32> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).ok()
}
