use crate::config::PackageAction;
use crate::template::{TemplateId, Variables};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Precondition checked immediately before an operation is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "predicate", content = "path", rename_all = "kebab-case")]
pub enum GuardCondition {
    /// Run only if the path does not exist.
    PathAbsentRequired(PathBuf),
}

impl GuardCondition {
    pub fn path(&self) -> &Path {
        match self {
            GuardCondition::PathAbsentRequired(path) => path,
        }
    }
}

impl fmt::Display for GuardCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardCondition::PathAbsentRequired(path) => {
                write!(f, "unless {} exists", path.display())
            }
        }
    }
}

/// A shell line run through `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellCommand {
    pub script: String,
    /// Run as this user; `None` keeps the converging user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            user: None,
            group: None,
            cwd: None,
        }
    }

    pub fn as_user(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.group = Some(group.into());
        self
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Wrap the script in `scl enable` when a software collection applies.
    pub fn within_collection(mut self, scl: Option<&str>) -> Self {
        if let Some(scl) = scl {
            self.script = format!("scl enable {} {}", shell_quote(scl), shell_quote(&self.script));
        }
        self
    }
}

/// The one-time privilege grant against a transient daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirstBootGrant {
    /// Foreground daemon, signaled and reaped when the grant finishes.
    pub daemon: ShellCommand,
    /// Socket the daemon must accept connections on before the client runs.
    pub socket: PathBuf,
    pub client: ShellCommand,
    /// Written only after the client succeeded and the daemon was reaped.
    pub marker: PathBuf,
    pub marker_owner: String,
    pub marker_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GuardedStep {
    Script(ShellCommand),
    FirstBoot(FirstBootGrant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OperationKind {
    EnablePackageChannel {
        channel: String,
    },
    InstallPackage {
        name: String,
        version: Option<String>,
        action: PackageAction,
    },
    DeletePath {
        path: PathBuf,
    },
    CreateDirectory {
        path: PathBuf,
        owner: String,
        group: String,
        mode: u32,
    },
    RenderTemplate {
        template: TemplateId,
        variables: Variables,
        destination: PathBuf,
        owner: String,
        group: String,
        mode: u32,
    },
    RunGuardedShell {
        name: String,
        step: GuardedStep,
    },
    ManageService {
        action: ServiceAction,
        service_name: String,
        init_script: PathBuf,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::EnablePackageChannel { .. } => "enable-package-channel",
            OperationKind::InstallPackage { .. } => "install-package",
            OperationKind::DeletePath { .. } => "delete-path",
            OperationKind::CreateDirectory { .. } => "create-directory",
            OperationKind::RenderTemplate { .. } => "render-template",
            OperationKind::RunGuardedShell { .. } => "run-guarded-shell",
            OperationKind::ManageService { .. } => "manage-service",
        }
    }

    pub fn uses_package_manager(&self) -> bool {
        matches!(
            self,
            OperationKind::EnablePackageChannel { .. } | OperationKind::InstallPackage { .. }
        )
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    /// e.g. `default :create /etc/mysql-default`
    pub description: String,
    #[serde(flatten)]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardCondition>,
}

impl Operation {
    pub fn new(instance: &str, verb: &str, subject: impl fmt::Display, kind: OperationKind) -> Self {
        Self {
            description: format!("{} :{} {}", instance, verb, subject),
            kind,
            guard: None,
        }
    }

    pub fn guarded_by(mut self, guard: GuardCondition) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Filesystem path the operation acts on, if any.
    pub fn target(&self) -> Option<&Path> {
        match &self.kind {
            OperationKind::DeletePath { path } | OperationKind::CreateDirectory { path, .. } => {
                Some(path)
            }
            OperationKind::RenderTemplate { destination, .. } => Some(destination),
            OperationKind::RunGuardedShell { .. } => self.guard.as_ref().map(|g| g.path()),
            OperationKind::ManageService { init_script, .. } => Some(init_script),
            OperationKind::EnablePackageChannel { .. } | OperationKind::InstallPackage { .. } => {
                None
            }
        }
    }
}

/// Quote a word for `sh` unless it only contains safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
