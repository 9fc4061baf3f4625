use anyhow::{Context, Result};
use chrono::Utc;

use crate::db::{sha256_file, ProjectContext, RepairIterationRecord, RepairRunRecord};
use crate::services::oracle::Oracle;
use crate::services::process::ProcessOracle;
use crate::services::repair::{
    RepairLoop, RepairOutcome, RepairPreview, RepairReport, RepairSettings,
};

/// Per-invocation overrides from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairOverrides {
    pub max_iterations: Option<usize>,
    pub stall_threshold: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

impl RepairOverrides {
    /// CLI values win over the project config.
    pub fn apply(&self, base: RepairSettings) -> RepairSettings {
        RepairSettings {
            max_iterations: self.max_iterations.unwrap_or(base.max_iterations),
            stall_threshold: self.stall_threshold.unwrap_or(base.stall_threshold),
            ..base
        }
    }
}

/// Binds the repair loop to a project: table, image, oracle and history.
pub struct RepairSession<'a> {
    pub ctx: &'a ProjectContext,
    pub overrides: RepairOverrides,
}

impl<'a> RepairSession<'a> {
    pub fn new(ctx: &'a ProjectContext, overrides: RepairOverrides) -> Self {
        Self { ctx, overrides }
    }

    pub fn settings(&self) -> RepairSettings {
        self.overrides.apply(self.ctx.config.repair)
    }

    /// Build the process oracle from the project config.
    pub fn process_oracle(&self) -> Result<ProcessOracle> {
        let config = self.ctx.config.oracle.as_ref().with_context(|| {
            format!(
                "No oracle configured in {}",
                self.ctx.layout.project_config_path.display()
            )
        })?;
        ProcessOracle::from_config(config, &self.ctx.layout.root, self.overrides.timeout_seconds)
            .context("Failed to build oracle from project config")
    }

    /// Full loop, persisting to the project's table file and recording history.
    pub fn run(&self, oracle: &mut dyn Oracle) -> Result<RepairReport> {
        let mut table = self.ctx.load_table()?;
        let image = self.ctx.load_image()?;
        let mut sink = self.ctx.table_file();

        let started_at = Utc::now().to_rfc3339();
        let mut repair = RepairLoop::new(self.settings());
        if let Some(image) = image.as_ref() {
            repair = repair.with_image(image);
        }
        let report = repair.run(&mut table, oracle, &mut sink);
        let finished_at = Utc::now().to_rfc3339();

        if let Err(err) = self.record(&report, started_at, finished_at) {
            log::warn!("Failed to record repair run: {err:#}");
        }
        Ok(report)
    }

    /// Single invocation; nothing is written.
    pub fn preview(&self, oracle: &mut dyn Oracle) -> Result<RepairPreview> {
        let table = self.ctx.load_table()?;
        let image = self.ctx.load_image()?;
        let mut repair = RepairLoop::new(self.settings());
        if let Some(image) = image.as_ref() {
            repair = repair.with_image(image);
        }
        repair.preview(&table, oracle).context("Failed to invoke oracle")
    }

    fn record(&self, report: &RepairReport, started_at: String, finished_at: String) -> Result<i64> {
        let binary_path = self.ctx.binary_path();
        let binary_hash = match binary_path.as_deref() {
            Some(path) if path.is_file() => Some(sha256_file(path)?),
            _ => None,
        };
        let detail = match &report.outcome {
            RepairOutcome::Converged => None,
            RepairOutcome::Stalled { address, work_completed } => Some(format!(
                "no progress at {} (work completed: {})",
                address.map(|a| format!("{a:#x}")).unwrap_or_else(|| "?".into()),
                work_completed.map(|n| n.to_string()).unwrap_or_else(|| "n/a".into())
            )),
            RepairOutcome::Aborted(reason) => Some(reason.to_string()),
        };

        let run = RepairRunRecord {
            id: None,
            binary: self.ctx.config.binary.clone(),
            binary_hash,
            table_path: self.ctx.config.table.clone(),
            outcome: report.outcome.as_str().to_string(),
            detail,
            iterations: report.iterations.len() as i64,
            splits: report.splits.len() as i64,
            started_at,
            finished_at,
        };
        let run_id = self.ctx.db.insert_repair_run(&run)?;
        for record in &report.iterations {
            self.ctx.db.insert_iteration(&RepairIterationRecord {
                run_id,
                iteration: record.iteration as i64,
                result: record.result.as_str().to_string(),
                address: record.result.address(),
                work_completed: record.work_completed.map(|n| n as i64),
                split_applied: record.split_applied,
            })?;
        }
        log::debug!("recorded repair run {run_id}");
        Ok(run_id)
    }
}
