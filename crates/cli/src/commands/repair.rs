use anyhow::Result;
use entryfix_core::model::SplitOutcome;
use entryfix_core::services::{
    Oracle, OracleResult, RepairOutcome, RepairOverrides, RepairPreview, RepairReport,
    RepairSession, StaticPassSummary,
};

use crate::commands::util::{format_address, open_context};

/// What `repair` ended with; drives the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairCommandOutcome {
    Preview(RepairPreview),
    Finished(RepairReport),
}

impl RepairCommandOutcome {
    /// `0` converged or dry run, `2` stalled, `3` aborted.
    pub fn exit_code(&self) -> u8 {
        match self {
            RepairCommandOutcome::Preview(_) => 0,
            RepairCommandOutcome::Finished(report) => match report.outcome {
                RepairOutcome::Converged => 0,
                RepairOutcome::Stalled { .. } => 2,
                RepairOutcome::Aborted(_) => 3,
            },
        }
    }
}

/// Drive the configured oracle. Without `apply` a single invocation is made
/// and nothing is written.
pub fn repair_command(
    root: &str,
    apply: bool,
    overrides: RepairOverrides,
) -> Result<RepairCommandOutcome> {
    let ctx = open_context(root)?;
    let session = RepairSession::new(&ctx, overrides);
    let mut oracle = session.process_oracle()?;
    run_with_oracle(&session, &mut oracle, apply)
}

/// Same as [`repair_command`] with a caller-supplied oracle.
pub fn run_with_oracle(
    session: &RepairSession<'_>,
    oracle: &mut dyn Oracle,
    apply: bool,
) -> Result<RepairCommandOutcome> {
    if !apply {
        let preview = session.preview(oracle)?;
        print_preview(&preview);
        return Ok(RepairCommandOutcome::Preview(preview));
    }

    let report = session.run(oracle)?;
    print_report(&report);
    Ok(RepairCommandOutcome::Finished(report))
}

fn print_static_pass(summary: &StaticPassSummary, applied: bool) {
    let verb = if applied { "Applied" } else { "Would apply" };
    println!(
        "{verb} {} call-target split(s) and {} delay-slot correction(s)",
        summary.call_target_splits.len(),
        summary.delay_slots.fixes.len()
    );
    if let Some(trailing) = &summary.delay_slots.trailing_branch {
        println!(
            "Warning: last function {} ends in a branch at {:#x}",
            trailing.function, trailing.branch_address
        );
    }
}

fn print_preview(preview: &RepairPreview) {
    println!("Dry run (pass --apply to modify the table)");
    if let Some(summary) = &preview.static_pass {
        print_static_pass(summary, false);
    }
    println!("Oracle: {}", preview.report.result);
    if let Some(work) = preview.report.work_completed {
        println!("Work completed: {work}");
    }
    match &preview.split {
        Some(Ok(SplitOutcome::Split { left, right })) => {
            println!(
                "Would split {} at {:#x} into {} and {}",
                left.name, right.address, left.name, right.name
            );
        }
        Some(Ok(SplitOutcome::AlreadyExists(entry))) => {
            println!("Entry point {:#x} already exists ({})", entry.address, entry.name);
        }
        Some(Err(err)) => println!("Cannot split: {err}"),
        None => {}
    }
}

fn print_report(report: &RepairReport) {
    if let Some(summary) = &report.static_pass {
        print_static_pass(summary, true);
    }
    for record in &report.iterations {
        let address = match record.result {
            OracleResult::UnresolvedCall(address) => format_address(Some(address)),
            _ => String::new(),
        };
        println!(
            "[{:>3}] {:<16} {:<12} work={}{}",
            record.iteration,
            record.result.as_str(),
            address,
            record.work_completed.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            if record.split_applied { " split" } else { "" }
        );
    }
    match &report.outcome {
        RepairOutcome::Converged => println!(
            "Converged after {} iteration(s), {} split(s)",
            report.iterations.len(),
            report.splits.len()
        ),
        RepairOutcome::Stalled { address, work_completed } => println!(
            "Stalled at {} (work completed: {}); no progress within the stall threshold",
            format_address(*address),
            work_completed.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
        ),
        RepairOutcome::Aborted(reason) => println!("Aborted: {reason}"),
    }
}
