use anyhow::{Context, Result};
use serde::Serialize;

use crate::commands::util::{format_address, open_context};
use entryfix_core::db::{RepairIterationRecord, RepairRunRecord};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryView {
    Runs(Vec<RepairRunRecord>),
    Iterations { run: RepairRunRecord, iterations: Vec<RepairIterationRecord> },
}

/// List recorded repair runs, or the iterations of one run.
pub fn history_command(root: &str, run: Option<i64>, json: bool) -> Result<HistoryView> {
    let ctx = open_context(root)?;
    let runs = ctx.db.list_repair_runs().context("Failed to list repair runs")?;

    let view = match run {
        None => HistoryView::Runs(runs),
        Some(id) => {
            let run = runs
                .into_iter()
                .find(|r| r.id == Some(id))
                .with_context(|| format!("No repair run with id {id}"))?;
            let iterations = ctx
                .db
                .list_iterations(id)
                .with_context(|| format!("Failed to list iterations of run {id}"))?;
            HistoryView::Iterations { run, iterations }
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(view);
    }

    match &view {
        HistoryView::Runs(runs) if runs.is_empty() => println!("No repair runs recorded."),
        HistoryView::Runs(runs) => {
            println!("Repair runs:");
            for run in runs {
                println!(
                    "- #{} {} [{}] iterations={} splits={}{}",
                    run.id.unwrap_or_default(),
                    run.started_at,
                    run.outcome,
                    run.iterations,
                    run.splits,
                    run.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
                );
            }
        }
        HistoryView::Iterations { run, iterations } => {
            println!(
                "Run #{} [{}] table={}",
                run.id.unwrap_or_default(),
                run.outcome,
                run.table_path
            );
            for it in iterations {
                println!(
                    "  [{:>3}] {:<16} {:<12} work={}{}",
                    it.iteration,
                    it.result,
                    format_address(it.address),
                    it.work_completed.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    if it.split_applied { " split" } else { "" }
                );
            }
        }
    }
    Ok(view)
}
