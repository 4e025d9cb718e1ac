//! Human and machine readable plan output.

use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL};
use linkplan_solver::{DeploymentPlan, RunReport};

use crate::cli::OutputFormat;

/// Render the plan, optionally grouped into execution levels.
pub fn plan(plan: &DeploymentPlan, format: OutputFormat, levels: bool) -> Result<String> {
    match format {
        OutputFormat::Json if levels => {
            let grouped: Vec<Vec<_>> = plan
                .execution_levels()
                .into_iter()
                .map(|level| level.into_iter().map(|index| &plan[index]).collect())
                .collect();
            serde_json::to_string_pretty(&grouped).context("Failed to serialize plan")
        }
        OutputFormat::Json => serde_json::to_string_pretty(plan).context("Failed to serialize plan"),
        OutputFormat::Table => Ok(table(plan, levels).to_string()),
    }
}

fn table(plan: &DeploymentPlan, levels: bool) -> Table {
    let mut level_of = vec![0; plan.len()];
    for (level, indices) in plan.execution_levels().into_iter().enumerate() {
        for index in indices {
            level_of[index] = level;
        }
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);

    let mut header = vec!["#", "Network", "Contract", "Links", "Status"];
    if levels {
        header.insert(1, "Level");
    }
    table.set_header(header);

    for (index, step) in plan.iter().enumerate() {
        let mut row = vec![
            index.to_string(),
            step.network().to_string(),
            step.contract_name().to_string(),
            step.dependencies().join(", "),
            step.status().to_string(),
        ];
        if levels {
            row.insert(1, level_of[index].to_string());
        }
        table.add_row(row);
    }

    table
}

/// One line summary of a run.
pub fn report(report: &RunReport) -> String {
    let mut summary = format!(
        "{} deployed, {} already done",
        report.completed.len(),
        report.skipped.len()
    );
    for (node, error) in &report.failed {
        summary.push_str(&format!("\nfailed: {node}: {error}"));
    }
    if !report.not_attempted.is_empty() {
        summary.push_str(&format!("\nnot attempted: {}", report.not_attempted.len()));
    }
    summary
}
