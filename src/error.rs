// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(mysql_service::config::error),
        help("Run `mysql-service validate` to check the configuration")
    )]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(mysql_service::config::validation),
        help("Run `mysql-service validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("Unsupported platform/version: mysql {version} on {family} {platform_version}")]
    #[diagnostic(
        code(mysql_service::config::unsupported_platform),
        help("Pick a mysql version the platform ships")
    )]
    UnsupportedPlatform {
        version: String,
        family: String,
        platform_version: String,
    },

    #[error("Template '{template}' requires variable '{variable}' but it was not provided")]
    #[diagnostic(code(mysql_service::template::missing_variable))]
    MissingTemplateVariable { template: String, variable: String },

    #[error("Template '{template}' does not accept variable '{variable}'")]
    #[diagnostic(code(mysql_service::template::unexpected_variable))]
    UnexpectedTemplateVariable { template: String, variable: String },

    #[error("Unknown template '{0}'")]
    #[diagnostic(code(mysql_service::template::unknown))]
    UnknownTemplate(String),

    #[error("Instance '{0}' is not declared")]
    #[diagnostic(
        code(mysql_service::instance::not_found),
        help("Declare the instance under 'instances:' in mysql-service.yaml")
    )]
    InstanceNotFound(String),

    #[error("Instances '{first}' and '{second}' both claim {resource}")]
    #[diagnostic(
        code(mysql_service::instance::allocation_conflict),
        help("Every instance needs its own name, port and directories")
    )]
    AllocationConflict {
        resource: String,
        first: String,
        second: String,
    },

    #[error("Instance '{0}' is already being converged by this process")]
    #[diagnostic(
        code(mysql_service::instance::busy),
        help("Wait for the running convergence to finish")
    )]
    InstanceBusy(String),

    #[error("Failed to run '{tool}': {reason}")]
    #[diagnostic(
        code(mysql_service::tool::invoke),
        help("Check that the command exists and is executable")
    )]
    ToolInvocation { tool: String, reason: String },

    #[error("'{tool}' exited with code {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    #[diagnostic(code(mysql_service::tool::failed))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Timed out after {}s waiting for {what}", .after.as_secs())]
    #[diagnostic(code(mysql_service::tool::timeout))]
    Timeout { what: String, after: Duration },

    #[error("Could not evaluate guard on '{}': {source}", .path.display())]
    #[diagnostic(
        code(mysql_service::guard::evaluation),
        help("Check permissions on the parent directories of the guard path")
    )]
    GuardEvaluation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Step '{step}' failed before writing '{}': {source}", .marker.display())]
    #[diagnostic(
        code(mysql_service::converge::partial),
        help("The guard is still unsatisfied; re-run the action to retry the whole step")
    )]
    PartialConvergence {
        step: String,
        marker: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(mysql_service::filesystem::error))]
    Filesystem(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Missing/invalid instance parameters, unsupported platform, template errors.
    Configuration,
    /// A package manager, database tool or daemon failed or could not be invoked.
    ExternalTool,
    /// A guard predicate could not be evaluated.
    GuardEvaluation,
    /// A guarded step failed before its completion marker was written.
    PartialConvergence,
    /// A filesystem primitive failed.
    Filesystem,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration error"),
            ErrorKind::ExternalTool => write!(f, "external tool error"),
            ErrorKind::GuardEvaluation => write!(f, "guard evaluation error"),
            ErrorKind::PartialConvergence => write!(f, "partial convergence"),
            ErrorKind::Filesystem => write!(f, "filesystem error"),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::Validation(_)
            | Error::UnsupportedPlatform { .. }
            | Error::MissingTemplateVariable { .. }
            | Error::UnexpectedTemplateVariable { .. }
            | Error::UnknownTemplate(_)
            | Error::InstanceNotFound(_)
            | Error::AllocationConflict { .. }
            | Error::InstanceBusy(_)
            | Error::Parse(_)
            | Error::Yaml(_) => ErrorKind::Configuration,
            Error::ToolInvocation { .. }
            | Error::ToolFailed { .. }
            | Error::Timeout { .. }
            | Error::InvalidPid { .. } => ErrorKind::ExternalTool,
            Error::GuardEvaluation { .. } => ErrorKind::GuardEvaluation,
            Error::PartialConvergence { .. } => ErrorKind::PartialConvergence,
            Error::Filesystem(_) | Error::Io(_) => ErrorKind::Filesystem,
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::InstanceNotFound(name) => Some(format!(
                "Declare '{}' under 'instances:' or check the spelling against `mysql-service validate`.",
                name
            )),
            Error::UnsupportedPlatform {
                family,
                platform_version,
                ..
            } => Some(format!(
                "No init script is shipped for this version on {} {}. Pick a version supported by the platform.",
                family, platform_version
            )),
            Error::AllocationConflict { resource, .. } => Some(format!(
                "Give each instance a distinct {}.",
                resource
            )),
            Error::GuardEvaluation { path, .. } => Some(format!(
                "Make sure the converging user can stat {}.",
                path.display()
            )),
            Error::PartialConvergence { marker, .. } => Some(format!(
                "Fix the underlying failure and re-run; the step runs again because {} was not written.",
                marker.display()
            )),
            Error::ToolInvocation { .. } => {
                Some("Check that the command exists and is executable".to_string())
            }
            Error::Timeout { .. } => Some(
                "Increase the matching value under 'timeouts:' if the host is slow".to_string(),
            ),
            Error::Config(_) | Error::Validation(_) => {
                Some("Validate your config with: mysql-service validate".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, owner: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for '{}' (refers to process group, not a process)",
                owner
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal PID 1 (init) for '{}'", owner),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for '{}', cannot convert safely",
                pid, owner
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pid_rejects_reserved() {
        assert!(matches!(
            validate_pid(0, "mysqld"),
            Err(Error::InvalidPid { pid: 0, .. })
        ));
        assert!(matches!(
            validate_pid(1, "mysqld"),
            Err(Error::InvalidPid { pid: 1, .. })
        ));
        assert!(validate_pid(u32::MAX, "mysqld").is_err());
        assert_eq!(validate_pid(4242, "mysqld").unwrap().as_raw(), 4242);
    }

    #[test]
    fn test_partial_convergence_is_classified_separately() {
        let err = Error::PartialConvergence {
            step: "grant initial privs".to_string(),
            marker: PathBuf::from("/etc/mysql-default/.first_converge"),
            source: Box::new(Error::ToolFailed {
                tool: "mysql".to_string(),
                code: Some(1),
                stderr: "access denied".to_string(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::PartialConvergence);
        assert!(err.to_string().contains(".first_converge"));
        assert!(err.with_suggestion().contains("Hint:"));
    }

    #[test]
    fn test_unsupported_platform_is_configuration_error() {
        let err = Error::UnsupportedPlatform {
            version: "5.6".to_string(),
            family: "rhel".to_string(),
            platform_version: "5".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Unsupported platform/version"));
    }

    #[test]
    fn test_tool_failed_display_without_exit_code() {
        let err = Error::ToolFailed {
            tool: "mysqld".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn test_yaml_error_is_configuration_error() {
        let err: Error = serde_yaml::from_str::<u16>("port: [").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
