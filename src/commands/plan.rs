use crate::output::{print_json, UserOutput};
use mysql_service::plan::GuardedStep;
use mysql_service::{Action, Config, Converger, OperationKind, Plan, SystemHost};
use std::sync::Arc;

pub fn run_plan(
    config: Config,
    action: Action,
    instances: &[String],
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    // Planning never touches the host.
    let host = Arc::new(SystemHost::new(config.timeouts));
    let converger = Converger::new(config, host);
    let plans = converger.plan(action, instances)?;

    if json {
        return print_json(&plans);
    }

    for plan in &plans {
        print_plan(plan, out);
    }
    Ok(())
}

fn print_plan(plan: &Plan, out: &dyn UserOutput) {
    out.status(&format!(
        "{} ({}): {} operation(s)",
        plan.instance,
        plan.action,
        plan.operations.len()
    ));

    for (i, op) in plan.operations.iter().enumerate() {
        out.status(&format!("  {:>2}. {}", i + 1, op.description));
        if let Some(detail) = detail(&op.kind) {
            out.status(&format!("      {}", detail));
        }
        if let Some(guard) = &op.guard {
            out.status(&format!("      guard: {}", guard));
        }
    }
    out.blank();
}

fn detail(kind: &OperationKind) -> Option<String> {
    match kind {
        OperationKind::EnablePackageChannel { channel } => Some(format!("channel {}", channel)),
        OperationKind::InstallPackage {
            name,
            version,
            action,
        } => Some(match version {
            Some(v) => format!("{} {}-{}", action, name, v),
            None => format!("{} {}", action, name),
        }),
        OperationKind::DeletePath { .. } => None,
        OperationKind::CreateDirectory {
            owner, group, mode, ..
        } => Some(format!("{}:{} {:04o}", owner, group, mode)),
        OperationKind::RenderTemplate {
            template,
            owner,
            group,
            mode,
            ..
        } => Some(format!("{} as {}:{} {:04o}", template, owner, group, mode)),
        OperationKind::RunGuardedShell { step, .. } => Some(match step {
            GuardedStep::Script(cmd) => cmd.script.clone(),
            GuardedStep::FirstBoot(grant) => grant.client.script.clone(),
        }),
        OperationKind::ManageService {
            action,
            init_script,
            ..
        } => Some(format!("{} {}", init_script.display(), action)),
    }
}
