use anyhow::{Context, Result};
use entryfix_core::analysis::{
    apply_call_targets, correct_delay_slots, find_split_delay_slots, plan_call_targets,
    scan_call_targets, CallTargetPlan, DelaySlotReport,
};
use serde::Serialize;

use crate::commands::util::open_context;

#[derive(Debug, Serialize)]
pub struct ScanCallsSummary {
    pub targets: usize,
    pub plan: CallTargetPlan,
    pub applied: Vec<u32>,
}

/// Report call targets missing from the table; `apply` splits at each of them.
pub fn scan_calls_command(root: &str, apply: bool, json: bool) -> Result<ScanCallsSummary> {
    let ctx = open_context(root)?;
    let image = ctx.require_image()?;
    let mut table = ctx.load_table()?;

    let targets = scan_call_targets(&image);
    let plan = plan_call_targets(&table, &targets);
    let applied = if apply && !plan.missing.is_empty() {
        let applied = apply_call_targets(&mut table, &targets);
        let path = ctx.table_path();
        table.store(&path).with_context(|| format!("Failed to write table at {}", path.display()))?;
        applied
    } else {
        Vec::new()
    };

    let summary = ScanCallsSummary { targets: targets.len(), plan, applied };
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary);
    }

    println!("Call targets: {}", summary.targets);
    println!("  Already entry points: {}", summary.plan.existing);
    println!("  Missing (inside a function): {}", summary.plan.missing.len());
    for address in &summary.plan.missing {
        println!("    {address:#x}");
    }
    if !summary.plan.outside.is_empty() {
        println!("  Outside the table: {}", summary.plan.outside.len());
        for address in &summary.plan.outside {
            println!("    {address:#x}");
        }
    }
    if apply {
        println!("Applied {} split(s)", summary.applied.len());
    } else if !summary.plan.missing.is_empty() {
        println!("Re-run with --apply to split at the missing targets.");
    }
    Ok(summary)
}

/// Run the delay-slot corrector; `apply` rewrites the table, `output` writes elsewhere.
pub fn fix_delay_slots_command(
    root: &str,
    apply: bool,
    output: Option<String>,
    json: bool,
) -> Result<DelaySlotReport> {
    let ctx = open_context(root)?;
    let image = ctx.require_image()?;
    let mut table = ctx.load_table()?;

    let split_before = find_split_delay_slots(&table, &image);
    let report = correct_delay_slots(&mut table, &image, ctx.config.repair.max_delay_slot_sweeps)
        .context("Failed to correct delay slots")?;

    let destination = match output {
        Some(path) => Some(ctx.layout.resolve(path)),
        None if apply => Some(ctx.table_path()),
        None => None,
    };
    if let Some(path) = &destination {
        table.store(path).with_context(|| format!("Failed to write table at {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }

    println!("Boundaries splitting a delay slot: {}", split_before.len());
    for address in &split_before {
        println!("  {address:#x}");
    }
    println!("Delay-slot corrections: {} ({} sweep(s))", report.fixes.len(), report.sweeps);
    for fix in &report.fixes {
        println!(
            "  {} @ {:#x}: delay slot taken from {}{}",
            fix.function,
            fix.branch_address,
            fix.next_function,
            if fix.removed_next { " (removed)" } else { "" }
        );
    }
    if let Some(trailing) = &report.trailing_branch {
        println!(
            "Warning: last function {} ends in a branch at {:#x}; its delay slot is outside the table",
            trailing.function, trailing.branch_address
        );
    }
    match &destination {
        Some(path) => println!("Wrote table to {}", path.display()),
        None if !report.fixes.is_empty() => {
            println!("Re-run with --apply (or --output PATH) to write the corrected table.")
        }
        None => {}
    }
    Ok(report)
}
