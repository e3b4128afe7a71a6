//! Lifecycle providers, one per platform family.

mod rhel;

pub use rhel::RhelProvider;

use crate::config::PlatformFamily;
use crate::context::InstanceContext;
use crate::error::{Error, Result};
use crate::plan::Operation;

/// The fixed set of lifecycle actions a platform family implements.
///
/// Providers only describe work; nothing here touches the host.
pub trait LifecycleProvider: Send + Sync {
    fn family(&self) -> PlatformFamily;

    fn create(&self, ctx: &InstanceContext) -> Result<Vec<Operation>>;

    fn start(&self, ctx: &InstanceContext) -> Result<Vec<Operation>>;

    /// Teardown is not implemented; the default plan is empty.
    fn delete(&self, _ctx: &InstanceContext) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }

    fn stop(&self, _ctx: &InstanceContext) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }

    fn restart(&self, _ctx: &InstanceContext) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }

    fn reload(&self, _ctx: &InstanceContext) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }
}

/// Provider for a platform family, chosen once per run.
pub fn provider_for(family: PlatformFamily) -> Result<Box<dyn LifecycleProvider>> {
    match family {
        PlatformFamily::Rhel => Ok(Box::new(RhelProvider::new())),
        PlatformFamily::Debian | PlatformFamily::Unknown => Err(Error::Config(format!(
            "No lifecycle provider for platform family '{}'",
            family
        ))),
    }
}
