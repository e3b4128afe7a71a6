use crate::output::{print_json, UserOutput};
use mysql_service::context::derive_contexts;
use mysql_service::markers::{CompletionMarker, MarkerState};
use mysql_service::Config;
use serde_json::json;
use std::path::Path;

pub fn run_validate(
    config: &Config,
    config_path: &Path,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.status(&format!("Validating {}...", config_path.display()));

    config.validate()?;
    let names: Vec<String> = config.instances.keys().cloned().collect();
    let contexts = derive_contexts(config, &names)?;

    if json {
        let instances = contexts
            .iter()
            .map(|ctx| {
                Ok(json!({
                    "name": ctx.name,
                    "version": ctx.version,
                    "port": ctx.port,
                    "package": ctx.package_name,
                    "service_name": ctx.service_name,
                    "config_file": ctx.config_file,
                    "data_dir": ctx.data_dir,
                    "socket_file": ctx.socket_file,
                    "initialized": marker_label(&ctx.data_marker)?,
                    "first_boot": marker_label(&ctx.first_converge_marker)?,
                }))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        return print_json(&json!({
            "config": config_path,
            "platform": config.platform.to_string(),
            "family": config.platform.family().to_string(),
            "instances": instances,
        }));
    }

    out.success("Configuration is valid");
    out.blank();

    out.status(&format!(
        "Platform: {} ({})",
        config.platform,
        config.platform.family()
    ));
    out.status(&format!("Instances: {}", contexts.len()));
    for ctx in &contexts {
        let package = ctx.package_name.as_deref().unwrap_or("unsupported on this platform");
        out.status(&format!(
            "  - {} (mysql {}, port {}, package {})",
            ctx.name, ctx.version, ctx.port, package
        ));
        out.status(&format!("      config:     {}", ctx.config_file.display()));
        out.status(&format!("      data:       {}", ctx.data_dir.display()));
        out.status(&format!("      socket:     {}", ctx.socket_file.display()));
        out.status(&format!(
            "      initialized: {}",
            marker_label(&ctx.data_marker)?
        ));
        out.status(&format!(
            "      first boot:  {}",
            marker_label(&ctx.first_converge_marker)?
        ));
    }

    Ok(())
}

fn marker_label(path: &Path) -> anyhow::Result<String> {
    Ok(match CompletionMarker::read(path)? {
        MarkerState::Absent => "pending".to_string(),
        MarkerState::Foreign => "yes".to_string(),
        MarkerState::Written(marker) => format!("yes ({})", marker.completed_at.to_rfc3339()),
    })
}
