//! Instance declarations.

use super::Platform;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// MySQL versions with main-config templates.
pub const SUPPORTED_VERSIONS: &[&str] = &["5.0", "5.1", "5.5", "5.6"];

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_RUN_USER: &str = "mysql";

/// How the package manager should treat the instance package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    #[default]
    Install,
    Upgrade,
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageAction::Install => write!(f, "install"),
            PackageAction::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// One entry under `instances:` as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    /// MySQL version; defaults to what the platform ships.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_run_user")]
    pub run_user: String,

    #[serde(default = "default_run_user")]
    pub run_group: String,

    /// Overrides the package name derived from version and platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,

    #[serde(default)]
    pub package_action: PackageAction,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_run_user() -> String {
    DEFAULT_RUN_USER.to_string()
}

impl Default for InstanceSpec {
    fn default() -> Self {
        Self {
            version: None,
            port: DEFAULT_PORT,
            run_user: default_run_user(),
            run_group: default_run_user(),
            package_name: None,
            package_version: None,
            package_action: PackageAction::Install,
        }
    }
}

/// A declared instance with platform defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub name: String,
    pub version: String,
    pub port: u16,
    pub run_user: String,
    pub run_group: String,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub package_action: PackageAction,
}

impl ServiceInstance {
    pub fn resolve(name: &str, spec: &InstanceSpec, platform: &Platform) -> Result<Self> {
        validate_instance_name(name)?;

        let version = match &spec.version {
            Some(v) => v.trim().to_string(),
            None => default_version(platform)?.to_string(),
        };
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(Error::Validation(format!(
                "Instance '{}' requests unsupported mysql version '{}' (supported: {})",
                name,
                version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        Ok(Self {
            name: name.to_string(),
            version,
            port: spec.port,
            run_user: spec.run_user.clone(),
            run_group: spec.run_group.clone(),
            package_name: spec.package_name.clone(),
            package_version: spec.package_version.clone(),
            package_action: spec.package_action,
        })
    }
}

/// Version a platform installs when the instance does not pin one.
pub fn default_version(platform: &Platform) -> Result<&'static str> {
    match platform.major_version()? {
        5 => Ok("5.0"),
        6 => Ok("5.1"),
        7 => Ok("5.6"),
        other => Err(Error::Validation(format!(
            "No default mysql version for {} {} (major {}); set 'version' explicitly",
            platform.name, platform.version, other
        ))),
    }
}

/// Instance names become path components, so they are restricted to a safe
/// alphabet instead of being sanitized (sanitizing could map two names onto
/// the same directory).
pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation(
            "Instance name cannot be empty".to_string(),
        ));
    }

    if name.starts_with('.') {
        return Err(Error::Validation(format!(
            "Instance name '{}' cannot start with a dot",
            name
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::Validation(format!(
            "Instance name '{}' contains '{}'; use letters, digits, '-' or '_'",
            name, bad
        )));
    }

    Ok(())
}
