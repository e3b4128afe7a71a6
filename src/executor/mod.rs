//! Plan execution.
//!
//! Operations run strictly in order. Each guard is evaluated immediately
//! before its operation, so earlier operations in the same run can satisfy
//! later guards. The first failure ends the action; there is no rollback and
//! no retry, since re-running the action is safe.

mod first_boot;
mod result;

pub use first_boot::wait_for_socket;
pub use result::{ActionResult, OperationReport, Outcome};

use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::guard::{GuardDecision, GuardEvaluator};
use crate::host::{HostPrimitives, PackageManagerLock};
use crate::plan::{GuardedStep, Operation, OperationKind, Plan, ShellCommand};
use crate::template::TemplateRenderer;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Whether operations are dispatched or only reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Apply,
    /// Evaluate guards, dispatch nothing.
    DryRun,
}

pub struct ActionExecutor {
    host: Arc<dyn HostPrimitives>,
    package_lock: Arc<PackageManagerLock>,
    guards: GuardEvaluator,
    renderer: TemplateRenderer,
    timeouts: Timeouts,
    mode: ExecutionMode,
}

impl ActionExecutor {
    pub fn new(
        host: Arc<dyn HostPrimitives>,
        package_lock: Arc<PackageManagerLock>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            host,
            package_lock,
            guards: GuardEvaluator::new(),
            renderer: TemplateRenderer::new(),
            timeouts,
            mode: ExecutionMode::Apply,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[tracing::instrument(skip_all, fields(instance = %plan.instance, action = %plan.action))]
    pub async fn execute(&self, plan: &Plan) -> ActionResult {
        let mut result = ActionResult::new(
            &plan.instance,
            plan.action,
            self.mode == ExecutionMode::DryRun,
        );

        for op in &plan.operations {
            let outcome = self.process(op).await;
            match &outcome {
                Outcome::Applied { changed: true } => tracing::info!("{} (changed)", op.description),
                Outcome::Applied { changed: false } => {
                    tracing::info!("{} (up to date)", op.description)
                }
                Outcome::SkippedByGuard => tracing::info!("{} (skipped by guard)", op.description),
                Outcome::WouldApply => tracing::info!("{} (would apply)", op.description),
                Outcome::Failed { reason, .. } => {
                    tracing::error!("{} failed: {}", op.description, reason)
                }
            }

            let failed = outcome.is_failed();
            result.push(OperationReport::new(op, outcome));
            if failed {
                break;
            }
        }

        result
    }

    async fn process(&self, op: &Operation) -> Outcome {
        if let Some(guard) = &op.guard {
            match self.guards.evaluate(guard) {
                Ok(GuardDecision::Skip) => return Outcome::SkippedByGuard,
                Ok(GuardDecision::Run) => {}
                Err(e) => return Outcome::failed(&e),
            }
        }

        if self.mode == ExecutionMode::DryRun {
            return Outcome::WouldApply;
        }

        match self.dispatch(op).await {
            Ok(changed) => Outcome::Applied { changed },
            Err(e) => Outcome::failed(&e),
        }
    }

    async fn dispatch(&self, op: &Operation) -> Result<bool> {
        let _package_lock = if op.kind.uses_package_manager() {
            Some(self.package_lock.acquire().await?)
        } else {
            None
        };

        let host = self.host.as_ref();
        match &op.kind {
            OperationKind::EnablePackageChannel { channel } => {
                host.enable_package_channel(channel).await
            }
            OperationKind::InstallPackage {
                name,
                version,
                action,
            } => host.install_package(name, version.as_deref(), *action).await,
            OperationKind::DeletePath { path } => host.delete_path(path).await,
            OperationKind::CreateDirectory {
                path,
                owner,
                group,
                mode,
            } => host.create_directory(path, owner, group, *mode).await,
            OperationKind::RenderTemplate {
                template,
                variables,
                destination,
                owner,
                group,
                mode,
            } => {
                let contents = self.renderer.render(template, variables)?;
                host.write_file(destination, &contents, owner, group, *mode)
                    .await
            }
            OperationKind::RunGuardedShell { name, step } => {
                let marker = op
                    .guard
                    .as_ref()
                    .map(|g| g.path().to_path_buf())
                    .unwrap_or_default();
                self.run_guarded(name, step, &marker).await?;
                Ok(true)
            }
            OperationKind::ManageService {
                action,
                service_name,
                init_script,
            } => host.manage_service(*action, service_name, init_script).await,
        }
    }

    /// Failures keep the guard unsatisfied and are reported as partial convergence.
    async fn run_guarded(&self, name: &str, step: &GuardedStep, marker: &Path) -> Result<()> {
        let run = match step {
            GuardedStep::Script(command) => self.run_shell(command).await,
            GuardedStep::FirstBoot(grant) => {
                first_boot::run(self.host.as_ref(), name, grant, &self.timeouts).await
            }
        };

        run.map_err(|source| Error::PartialConvergence {
            step: name.to_string(),
            marker: marker.to_path_buf(),
            source: Box::new(source),
        })?;

        if !marker.as_os_str().is_empty() && !marker.exists() {
            tracing::warn!(
                "'{}' succeeded but {} is still absent; it will run again next time",
                name,
                marker.display()
            );
        }
        Ok(())
    }

    async fn run_shell(&self, command: &ShellCommand) -> Result<()> {
        bounded(
            self.timeouts.shell,
            command.script.clone(),
            self.host.run_shell(command),
        )
        .await
    }
}

/// Apply a timeout to a host future.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: impl Into<String>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout {
            what: what.into(),
            after: limit,
        })?
}
