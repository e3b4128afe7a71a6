//! Convergence planning.
//!
//! A [`Plan`] is the ordered operation list for one (action, instance) pair.
//! Plans are regenerated on every run and carry no host state: guards are
//! attached to operations here but only evaluated by the executor.

mod operation;

pub use operation::*;

use crate::config::PlatformFamily;
use crate::context::InstanceContext;
use crate::error::Result;
use crate::provider::{provider_for, LifecycleProvider};
use crate::template::TemplateRenderer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle actions an instance accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Delete,
    Start,
    Stop,
    Restart,
    Reload,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Delete,
        Action::Start,
        Action::Stop,
        Action::Restart,
        Action::Reload,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reload => "reload",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Invalid action '{}'. Valid options: create, delete, start, stop, restart, reload",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub instance: String,
    pub action: Action,
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Produces plans through the lifecycle provider of one platform family.
pub struct ConvergencePlanner {
    provider: Box<dyn LifecycleProvider>,
    renderer: TemplateRenderer,
}

impl ConvergencePlanner {
    /// Select the provider for a platform family.
    pub fn for_family(family: PlatformFamily) -> Result<Self> {
        Ok(Self::with_provider(provider_for(family)?))
    }

    pub fn with_provider(provider: Box<dyn LifecycleProvider>) -> Self {
        Self {
            provider,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn family(&self) -> PlatformFamily {
        self.provider.family()
    }

    /// Ordered operations for `action` on one instance.
    ///
    /// Template variable sets are checked here so a configuration error is
    /// reported before any operation has run.
    #[tracing::instrument(skip(self, ctx), fields(instance = %ctx.name, action = %action))]
    pub fn plan(&self, action: Action, ctx: &InstanceContext) -> Result<Plan> {
        let operations = match action {
            Action::Create => self.provider.create(ctx)?,
            Action::Delete => self.provider.delete(ctx)?,
            Action::Start => self.provider.start(ctx)?,
            Action::Stop => self.provider.stop(ctx)?,
            Action::Restart => self.provider.restart(ctx)?,
            Action::Reload => self.provider.reload(ctx)?,
        };

        for op in &operations {
            if let OperationKind::RenderTemplate {
                template,
                variables,
                ..
            } = &op.kind
            {
                self.renderer.check(template, variables)?;
            }
        }

        tracing::debug!("Planned {} operation(s)", operations.len());
        Ok(Plan {
            instance: ctx.name.clone(),
            action,
            operations,
        })
    }
}
