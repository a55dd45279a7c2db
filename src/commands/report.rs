use std::path::Path;

use crate::batch::{EntryReport, LinkPlan, PlannedAction};
use crate::link::{LinkMode, LinkOutcome};
use crate::tool::ToolReport;

pub(crate) fn describe_outcome(outcome: LinkOutcome, link: &Path, source: &Path) -> String {
    match outcome {
        LinkOutcome::Created(LinkMode::Symlink) => {
            format!("Created symlink: {} -> {}", link.display(), source.display())
        }
        LinkOutcome::Created(LinkMode::Copy) => {
            format!("Created copy: {} (symlinks not supported)", link.display())
        }
        LinkOutcome::Replaced(LinkMode::Symlink) => {
            format!("Replaced symlink: {} -> {}", link.display(), source.display())
        }
        LinkOutcome::Replaced(LinkMode::Copy) => {
            format!("Replaced copy: {} (symlinks not supported)", link.display())
        }
        LinkOutcome::Skipped => {
            format!("Already linked: {} -> {}", link.display(), source.display())
        }
    }
}

pub(crate) fn report_lines(report: &EntryReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(1 + report.setup_links.len());
    match report.outcome {
        Some(outcome) => lines.push(describe_outcome(
            outcome,
            &report.link_path,
            &report.source_dir,
        )),
        None if report.dry_run => lines.push(format!(
            "Dry run: would link {} -> {}",
            report.link_path.display(),
            report.source_dir.display()
        )),
        None => lines.push(format!("Skipped resources for {}", report.label)),
    }
    for setup in &report.setup_links {
        lines.push(format!(
            "  {}",
            describe_outcome(setup.outcome, &setup.target, &setup.source)
        ));
    }
    if let Some(tool) = &report.tool {
        lines.extend(tool_lines(tool));
    }
    lines
}

fn tool_lines(tool: &ToolReport) -> Vec<String> {
    let dir = tool.project_dir.display();
    let mut lines = vec![format!(
        "Prepared {}{}",
        dir,
        if tool.refreshed { " (uvx refreshed)" } else { "" }
    )];
    if tool.console_scripts.is_empty() {
        lines.push(format!("  uvx --from {} <command>", dir));
    }
    for script in &tool.console_scripts {
        lines.push(format!("  uvx --from {} {}", dir, script));
    }
    lines
}

pub(crate) fn print_reports(reports: &[EntryReport]) {
    for report in reports {
        for line in report_lines(report) {
            println!("{}", line);
        }
    }
}

pub(crate) fn plan_line(plan: &LinkPlan) -> String {
    let action = match plan.action {
        PlannedAction::Create => "create",
        PlannedAction::Skip => "skip",
        PlannedAction::Replace => "replace",
    };
    let mut line = format!(
        "{}: {} {} -> {}",
        plan.label,
        action,
        plan.link_path.display(),
        plan.source_dir.display()
    );
    if plan.run_setup {
        line.push_str(" (+setup)");
    }
    if plan.dry_run {
        line.push_str(" [dry run]");
    }
    line
}
