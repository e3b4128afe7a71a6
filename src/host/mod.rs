//! Host primitives: the boundary between convergence logic and the machine.
//!
//! - `system` - Real host: yum/rpm, filesystem with ownership, sysvinit
//! - `recording` - Test double recording every call
//! - `package_lock` - Host-wide package manager serialization

mod package_lock;
mod recording;
mod system;

pub use package_lock::{PackageLockGuard, PackageManagerLock};
pub use recording::{HostCall, RecordingHost};
pub use system::SystemHost;

use crate::config::PackageAction;
use crate::error::Result;
use crate::plan::{ServiceAction, ShellCommand};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Primitive effects convergence is built from.
///
/// Methods returning `bool` report whether the host changed.
#[async_trait]
pub trait HostPrimitives: Send + Sync {
    async fn enable_package_channel(&self, channel: &str) -> Result<bool>;

    async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
        action: PackageAction,
    ) -> Result<bool>;

    /// Absence is success.
    async fn delete_path(&self, path: &Path) -> Result<bool>;

    /// Create recursively, then apply owner, group and mode to the leaf.
    async fn create_directory(&self, path: &Path, owner: &str, group: &str, mode: u32)
        -> Result<bool>;

    /// Write atomically. Unchanged content still has ownership and mode enforced.
    async fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<bool>;

    /// Run to completion; non-zero exit is an error.
    async fn run_shell(&self, command: &ShellCommand) -> Result<()>;

    /// Start a foreground daemon in its own process group.
    async fn spawn_daemon(&self, command: &ShellCommand) -> Result<Box<dyn DaemonHandle>>;

    async fn manage_service(
        &self,
        action: ServiceAction,
        service_name: &str,
        init_script: &Path,
    ) -> Result<bool>;
}

/// A running transient daemon.
#[async_trait]
pub trait DaemonHandle: Send {
    fn id(&self) -> Option<u32>;

    /// `Some(description)` once the daemon has exited.
    fn try_exited(&mut self) -> Result<Option<String>>;

    /// SIGTERM, then SIGKILL after `grace`, then reap.
    async fn terminate(self: Box<Self>, grace: Duration) -> Result<()>;
}
