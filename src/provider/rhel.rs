//! Red Hat family: yum packages, sysvinit scripts under the init root.

use super::LifecycleProvider;
use crate::config::PlatformFamily;
use crate::context::InstanceContext;
use crate::error::{Error, Result};
use crate::plan::{
    shell_quote, FirstBootGrant, GuardCondition, GuardedStep, Operation, OperationKind,
    ServiceAction, ShellCommand,
};
use crate::template::{
    init_script_variables, main_config_variables, InitScriptKey, TemplateRenderer,
};
use std::path::{Path, PathBuf};

pub const INIT_STEP: &str = "initialize mysql database";
pub const GRANT_STEP: &str = "grant initial privs";

const GRANT_SQL: &str =
    "GRANT ALL PRIVILEGES ON *.* TO 'root'@'%' WITH GRANT OPTION; FLUSH PRIVILEGES;";

fn quote_path(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}

#[derive(Debug, Default)]
pub struct RhelProvider {
    renderer: TemplateRenderer,
}

impl RhelProvider {
    pub fn new() -> Self {
        Self {
            renderer: TemplateRenderer::new(),
        }
    }

    fn directories(ctx: &InstanceContext) -> [(&PathBuf, u32); 5] {
        [
            (&ctx.etc_dir, 0o750),
            (&ctx.include_dir, 0o750),
            (&ctx.run_dir, 0o755),
            (&ctx.data_dir, 0o750),
            (&ctx.log_dir, 0o750),
        ]
    }

    fn initialize_database(ctx: &InstanceContext) -> Operation {
        let command = ShellCommand::new(format!(
            "{} --datadir={} --user={}",
            quote_path(&ctx.binaries.mysql_install_db),
            quote_path(&ctx.data_dir),
            shell_quote(&ctx.run_user)
        ))
        .within_collection(ctx.scl_name.as_deref())
        .as_user(&ctx.run_user, &ctx.run_group)
        .in_dir(&ctx.data_dir);

        Operation::new(
            &ctx.name,
            "run",
            INIT_STEP,
            OperationKind::RunGuardedShell {
                name: INIT_STEP.to_string(),
                step: GuardedStep::Script(command),
            },
        )
        .guarded_by(GuardCondition::PathAbsentRequired(ctx.data_marker.clone()))
    }

    fn grant_initial_privileges(ctx: &InstanceContext) -> Operation {
        let daemon = ShellCommand::new(format!(
            "exec {} --defaults-file={}",
            quote_path(&ctx.binaries.mysqld),
            quote_path(&ctx.config_file)
        ))
        .within_collection(ctx.scl_name.as_deref())
        .as_user(&ctx.run_user, &ctx.run_group)
        .in_dir(&ctx.data_dir);

        // The client connects over the socket as the converging user.
        let client = ShellCommand::new(format!(
            "{} -S {} -e \"{}\"",
            quote_path(&ctx.binaries.mysql),
            quote_path(&ctx.socket_file),
            GRANT_SQL
        ))
        .within_collection(ctx.scl_name.as_deref());

        Operation::new(
            &ctx.name,
            "run",
            GRANT_STEP,
            OperationKind::RunGuardedShell {
                name: GRANT_STEP.to_string(),
                step: GuardedStep::FirstBoot(FirstBootGrant {
                    daemon,
                    socket: ctx.socket_file.clone(),
                    client,
                    marker: ctx.first_converge_marker.clone(),
                    marker_owner: ctx.run_user.clone(),
                    marker_group: ctx.run_group.clone(),
                }),
            },
        )
        .guarded_by(GuardCondition::PathAbsentRequired(
            ctx.first_converge_marker.clone(),
        ))
    }
}

impl LifecycleProvider for RhelProvider {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Rhel
    }

    fn create(&self, ctx: &InstanceContext) -> Result<Vec<Operation>> {
        let package = ctx
            .package_name
            .clone()
            .ok_or_else(|| Error::UnsupportedPlatform {
                version: ctx.version.clone(),
                family: ctx.family.to_string(),
                platform_version: ctx.platform.version.clone(),
            })?;

        let mut ops = Vec::with_capacity(12);

        // el5 ships every supported build natively.
        if ctx.platform_major != 5 {
            if let Some(channel) = &ctx.package_channel {
                ops.push(Operation::new(
                    &ctx.name,
                    "enable",
                    channel,
                    OperationKind::EnablePackageChannel {
                        channel: channel.clone(),
                    },
                ));
            }
        }

        ops.push(Operation::new(
            &ctx.name,
            &ctx.package_action.to_string(),
            &package,
            OperationKind::InstallPackage {
                name: package.clone(),
                version: ctx.package_version.clone(),
                action: ctx.package_action,
            },
        ));

        // mysqld reads these before --defaults-file settings take effect.
        for legacy in &ctx.legacy_config_files {
            ops.push(Operation::new(
                &ctx.name,
                "delete",
                legacy.display(),
                OperationKind::DeletePath {
                    path: legacy.clone(),
                },
            ));
        }

        for (dir, mode) in Self::directories(ctx) {
            ops.push(Operation::new(
                &ctx.name,
                "create",
                dir.display(),
                OperationKind::CreateDirectory {
                    path: dir.clone(),
                    owner: ctx.run_user.clone(),
                    group: ctx.run_group.clone(),
                    mode,
                },
            ));
        }

        ops.push(Operation::new(
            &ctx.name,
            "render",
            ctx.config_file.display(),
            OperationKind::RenderTemplate {
                template: self.renderer.main_config(&ctx.version)?,
                variables: main_config_variables(ctx),
                destination: ctx.config_file.clone(),
                owner: ctx.run_user.clone(),
                group: ctx.run_group.clone(),
                mode: 0o600,
            },
        ));

        ops.push(Self::initialize_database(ctx));
        ops.push(Self::grant_initial_privileges(ctx));

        Ok(ops)
    }

    fn start(&self, ctx: &InstanceContext) -> Result<Vec<Operation>> {
        let template = self.renderer.init_script(&InitScriptKey::for_context(ctx))?;

        Ok(vec![
            Operation::new(
                &ctx.name,
                "render",
                ctx.init_script.display(),
                OperationKind::RenderTemplate {
                    template,
                    variables: init_script_variables(ctx),
                    destination: ctx.init_script.clone(),
                    owner: "root".to_string(),
                    group: "root".to_string(),
                    mode: 0o755,
                },
            ),
            Operation::new(
                &ctx.name,
                "start",
                &ctx.service_name,
                OperationKind::ManageService {
                    action: ServiceAction::Start,
                    service_name: ctx.service_name.clone(),
                    init_script: ctx.init_script.clone(),
                },
            ),
        ])
    }
}
