use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::{AttemptStatus, NodeDecision};
use crate::orchestrator::RunReport;

/// Render a markdown digest of a run for review or CI comments.
pub fn render_run_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Run Summary\n\n");
    out.push_str(&format!(
        "- run: `{}`\n- nodes: {}\n- selected: {}\n- failed: {}\n- duration: {} ms\n\n",
        report.run_id,
        report.decisions.len(),
        report.selection.selected.len(),
        report.failed_nodes.len(),
        report.duration_ms
    ));
    if let Some(node) = &report.aborted_at {
        out.push_str(&format!("- aborted at: `{node}`\n\n"));
    }

    out.push_str("| node | status | attempts | candidates | winner | score |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for decision in &report.decisions {
        let status = decision
            .status()
            .map(AttemptStatus::as_str)
            .unwrap_or("pending");
        let (winner, score) = match &decision.selected {
            Some(sel) => (
                format!("{}/{}", sel.attempt, sel.candidate),
                format!("{:.3}", sel.score),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            decision.node_id,
            status,
            decision.attempts.len(),
            decision.candidates().count(),
            winner,
            score
        ));
    }

    let failing: Vec<&NodeDecision> = report
        .decisions
        .iter()
        .filter(|d| d.status().is_some_and(AttemptStatus::is_failure))
        .collect();
    if !failing.is_empty() {
        out.push_str("\n## Blocking Reasons\n");
        for decision in failing {
            let mut reasons: Vec<String> = decision
                .candidates()
                .flat_map(|c| {
                    c.gates
                        .iter()
                        .filter(|g| g.blocks())
                        .map(|g| format!("{}: {}", g.gate_id, g.reason))
                        .chain(c.error.clone())
                })
                .collect();
            reasons.sort();
            reasons.dedup();
            out.push_str(&format!("- `{}`: {}\n", decision.node_id, reasons.join(", ")));
        }
    }
    out
}

/// Write the run summary markdown to `path`.
pub fn write_run_summary_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_run_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
