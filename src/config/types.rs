//! Core configuration types.
//!
//! This module contains the root [`Config`] struct for `mysql-service.yaml`.

use super::{InstanceSpec, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the host-wide package manager lock file.
pub const DEFAULT_PACKAGE_LOCK: &str = "/var/lock/mysql-service.package.lock";

/// Root configuration structure for mysql-service.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub platform: Platform,

    #[serde(default)]
    pub roots: Roots,

    /// Advisory lock file serializing package manager access across processes.
    #[serde(default = "default_package_lock")]
    pub package_lock: PathBuf,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Declared instances keyed by name.
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceSpec>,
}

fn default_package_lock() -> PathBuf {
    PathBuf::from(DEFAULT_PACKAGE_LOCK)
}

/// Filesystem roots every instance path is derived from.
///
/// Only the roots are configurable; individual instance directories are not,
/// so the rendered configuration can never drift from the directories it
/// references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roots {
    pub etc: PathBuf,
    pub run: PathBuf,
    pub log: PathBuf,
    pub data: PathBuf,
    /// Directory holding sysvinit scripts.
    pub init: PathBuf,
}

impl Default for Roots {
    fn default() -> Self {
        Self {
            etc: PathBuf::from("/etc"),
            run: PathBuf::from("/var/run"),
            log: PathBuf::from("/var/log"),
            data: PathBuf::from("/var/lib"),
            init: PathBuf::from("/etc/init.d"),
        }
    }
}

impl Roots {
    /// All roots under a single prefix (used for sandboxed runs and tests).
    pub fn under(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            etc: prefix.join("etc"),
            run: prefix.join("var/run"),
            log: prefix.join("var/log"),
            data: prefix.join("var/lib"),
            init: prefix.join("etc/init.d"),
        }
    }
}

/// Upper bounds for external work performed during convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Any single shell step (database initialization, client statements).
    #[serde(with = "super::duration")]
    pub shell: Duration,
    /// How long the transient daemon may take to accept socket connections.
    #[serde(with = "super::duration")]
    pub daemon_startup: Duration,
    /// Grace period between SIGTERM and SIGKILL for the transient daemon.
    #[serde(with = "super::duration")]
    pub daemon_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            shell: Duration::from_secs(300),
            daemon_startup: Duration::from_secs(30),
            daemon_grace: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Minimal configuration for a platform with no instances declared.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            roots: Roots::default(),
            package_lock: default_package_lock(),
            timeouts: Timeouts::default(),
            instances: BTreeMap::new(),
        }
    }

    /// Instance names matching a selection; an empty selection means all.
    pub fn select_instances(&self, selection: &[String]) -> crate::Result<Vec<String>> {
        if selection.is_empty() {
            return Ok(self.instances.keys().cloned().collect());
        }

        let mut names = Vec::with_capacity(selection.len());
        for name in selection {
            if !self.instances.contains_key(name) {
                return Err(crate::Error::InstanceNotFound(name.clone()));
            }
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}
