//! Top-level convergence: configuration in, per-instance results out.
//!
//! Everything that can fail for configuration reasons (validation, context
//! derivation, allocation conflicts, template variables, init-script lookup)
//! fails here before the first host primitive runs. Instances then converge
//! concurrently, each strictly in plan order.

mod claims;

pub use claims::{ClaimGuard, InstanceClaims};

use crate::config::Config;
use crate::context::{derive_contexts, InstanceContext};
use crate::error::Result;
use crate::executor::{ActionExecutor, ActionResult, ExecutionMode};
use crate::host::{HostPrimitives, PackageManagerLock};
use crate::plan::{Action, ConvergencePlanner, Plan};
use futures::future::join_all;
use std::sync::Arc;

pub struct Converger {
    config: Config,
    host: Arc<dyn HostPrimitives>,
    claims: Arc<InstanceClaims>,
    package_lock: Arc<PackageManagerLock>,
    mode: ExecutionMode,
}

impl Converger {
    pub fn new(config: Config, host: Arc<dyn HostPrimitives>) -> Self {
        let package_lock = Arc::new(PackageManagerLock::new(&config.package_lock));
        Self {
            config,
            host,
            claims: InstanceClaims::new(),
            package_lock,
            mode: ExecutionMode::Apply,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Share a claims registry with other convergers in this process.
    pub fn with_claims(mut self, claims: Arc<InstanceClaims>) -> Self {
        self.claims = claims;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validated contexts for the selected instances (all when empty).
    pub fn contexts(&self, selection: &[String]) -> Result<Vec<InstanceContext>> {
        self.config.validate()?;
        let names = self.config.select_instances(selection)?;
        derive_contexts(&self.config, &names)
    }

    /// Plans for the selected instances without touching the host.
    pub fn plan(&self, action: Action, selection: &[String]) -> Result<Vec<Plan>> {
        let contexts = self.contexts(selection)?;
        let planner = ConvergencePlanner::for_family(self.config.platform.family())?;
        contexts
            .iter()
            .map(|ctx| planner.plan(action, ctx))
            .collect()
    }

    #[tracing::instrument(skip(self, selection), fields(platform = %self.config.platform))]
    pub async fn converge(&self, action: Action, selection: &[String]) -> Result<Vec<ActionResult>> {
        let contexts = self.contexts(selection)?;
        let planner = ConvergencePlanner::for_family(self.config.platform.family())?;

        let _claims = self.claims.claim(&contexts)?;
        let plans = contexts
            .iter()
            .map(|ctx| planner.plan(action, ctx))
            .collect::<Result<Vec<_>>>()?;

        let executor = ActionExecutor::new(
            Arc::clone(&self.host),
            Arc::clone(&self.package_lock),
            self.config.timeouts,
        )
        .with_mode(self.mode);

        tracing::info!("Converging {} instance(s): {}", plans.len(), action);
        let results = join_all(plans.iter().map(|plan| executor.execute(plan))).await;
        Ok(results)
    }
}
