use crate::cli::Selection;
use crate::output::{print_json, UserOutput};
use mysql_service::executor::OperationReport;
use mysql_service::{Action, ActionResult, Config, Converger, ExecutionMode, Outcome, SystemHost};
use std::sync::Arc;

/// Converge the selected instances. Returns whether every instance converged.
pub async fn run_action(
    config: Config,
    action: Action,
    selection: &Selection,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<bool> {
    let mode = if selection.dry_run {
        ExecutionMode::DryRun
    } else {
        ExecutionMode::Apply
    };
    let host = Arc::new(SystemHost::new(config.timeouts));
    let converger = Converger::new(config, host).with_mode(mode);

    let results = converger.converge(action, &selection.instances).await?;

    if json {
        print_json(&results)?;
    } else {
        for result in &results {
            print_result(result, out);
        }
    }

    Ok(results.iter().all(|r| r.converged))
}

fn print_result(result: &ActionResult, out: &dyn UserOutput) {
    let header = if result.dry_run {
        format!("{} ({}, dry run):", result.instance, result.action)
    } else {
        format!("{} ({}):", result.instance, result.action)
    };
    out.status(&header);

    if result.reports.is_empty() {
        out.status("  nothing to do");
    }
    for report in &result.reports {
        print_report(report, out);
    }

    if let Some(failure) = result.failure() {
        out.error(&format!("{}: failed at {}", result.instance, failure.description));
    } else if result.dry_run {
        out.success(&format!("{}: plan checked", result.instance));
    } else {
        out.success(&format!(
            "{}: converged ({} changed, {} skipped)",
            result.instance,
            result.changed_count(),
            result.skipped().count()
        ));
    }
    out.blank();
}

fn print_report(report: &OperationReport, out: &dyn UserOutput) {
    match &report.outcome {
        Outcome::Applied { changed: true } => {
            out.status(&format!("  changed   {}", report.description))
        }
        Outcome::Applied { changed: false } => {
            out.status(&format!("  ok        {}", report.description))
        }
        Outcome::SkippedByGuard => out.status(&format!("  skipped   {}", report.description)),
        Outcome::WouldApply => out.status(&format!("  would run {}", report.description)),
        Outcome::Failed { kind, reason, hint } => {
            out.error(&format!("  failed    {}", report.description));
            out.error(&format!("    kind:   {}", kind));
            if let Some(target) = &report.target {
                out.error(&format!("    target: {}", target.display()));
            }
            out.error(&format!("    reason: {}", reason));
            if let Some(hint) = hint {
                out.error(&format!("    hint:   {}", hint));
            }
        }
    }
}
