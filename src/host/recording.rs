//! In-memory host for tests and sandboxed dry runs.
//!
//! Filesystem primitives take effect (without ownership changes, so tests run
//! unprivileged under temporary roots); package, shell and service primitives
//! are only recorded. The fake daemon binds a real Unix socket so readiness
//! checks behave as they would against mysqld.

use super::{DaemonHandle, HostPrimitives};
use crate::config::PackageAction;
use crate::error::{Error, Result};
use crate::plan::{ServiceAction, ShellCommand};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One primitive invocation, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    EnablePackageChannel(String),
    InstallPackage {
        name: String,
        version: Option<String>,
        action: PackageAction,
    },
    DeletePath(PathBuf),
    CreateDirectory {
        path: PathBuf,
        owner: String,
        group: String,
        mode: u32,
    },
    WriteFile {
        path: PathBuf,
        owner: String,
        group: String,
        mode: u32,
    },
    RunShell(String),
    SpawnDaemon(String),
    DaemonReaped(String),
    ManageService {
        action: ServiceAction,
        service_name: String,
    },
}

impl HostCall {
    pub fn kind(&self) -> &'static str {
        match self {
            HostCall::EnablePackageChannel(_) => "enable-package-channel",
            HostCall::InstallPackage { .. } => "install-package",
            HostCall::DeletePath(_) => "delete-path",
            HostCall::CreateDirectory { .. } => "create-directory",
            HostCall::WriteFile { .. } => "write-file",
            HostCall::RunShell(_) => "run-shell",
            HostCall::SpawnDaemon(_) => "spawn-daemon",
            HostCall::DaemonReaped(_) => "daemon-reaped",
            HostCall::ManageService { .. } => "manage-service",
        }
    }

    /// Channel, package, path, script or service the call acted on.
    pub fn subject(&self) -> String {
        match self {
            HostCall::EnablePackageChannel(channel) => channel.clone(),
            HostCall::InstallPackage { name, .. } => name.clone(),
            HostCall::DeletePath(path)
            | HostCall::CreateDirectory { path, .. }
            | HostCall::WriteFile { path, .. } => path.display().to_string(),
            HostCall::RunShell(script)
            | HostCall::SpawnDaemon(script)
            | HostCall::DaemonReaped(script) => script.clone(),
            HostCall::ManageService { service_name, .. } => service_name.clone(),
        }
    }
}

struct Failure {
    kind: &'static str,
    needle: Option<String>,
    message: String,
}

/// Side effect attached to shell scripts containing a pattern.
struct ShellEffect {
    needle: String,
    creates: PathBuf,
}

#[derive(Default)]
struct Behaviour {
    failures: Vec<Failure>,
    shell_effects: Vec<ShellEffect>,
    daemon_listens: bool,
    daemon_exits_early: bool,
}

/// Package manager state; survives [`RecordingHost::clear`].
#[derive(Default)]
struct Packages {
    channels: HashSet<String>,
    installed: HashSet<String>,
}

pub struct RecordingHost {
    calls: Arc<Mutex<Vec<HostCall>>>,
    behaviour: Mutex<Behaviour>,
    packages: Mutex<Packages>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            behaviour: Mutex::new(Behaviour {
                daemon_listens: true,
                ..Behaviour::default()
            }),
            packages: Mutex::new(Packages::default()),
        }
    }

    /// Fail every call of `kind` whose subject contains `needle` (any subject when `None`).
    pub fn fail_on(&self, kind: &'static str, needle: Option<&str>, message: impl Into<String>) {
        self.behaviour.lock().failures.push(Failure {
            kind,
            needle: needle.map(str::to_string),
            message: message.into(),
        });
    }

    /// Create `path` whenever a shell script containing `needle` runs successfully,
    /// the way mysql_install_db creates the engine schema.
    pub fn creates_on_shell(&self, needle: impl Into<String>, path: impl Into<PathBuf>) {
        self.behaviour.lock().shell_effects.push(ShellEffect {
            needle: needle.into(),
            creates: path.into(),
        });
    }

    /// The fake daemon starts but never binds its socket.
    pub fn daemon_never_listens(&self) {
        self.behaviour.lock().daemon_listens = false;
    }

    /// The fake daemon exits immediately after spawning.
    pub fn daemon_exits_early(&self) {
        let mut behaviour = self.behaviour.lock();
        behaviour.daemon_listens = false;
        behaviour.daemon_exits_early = true;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<HostCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    /// Forget recorded calls. Installed packages and enabled channels stay.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: HostCall) -> Result<()> {
        let failure = {
            let behaviour = self.behaviour.lock();
            behaviour
                .failures
                .iter()
                .find(|f| {
                    f.kind == call.kind()
                        && f.needle
                            .as_deref()
                            .map_or(true, |n| call.subject().contains(n))
                })
                .map(|f| f.message.clone())
        };
        let kind = call.kind();
        self.calls.lock().push(call);

        match failure {
            None => Ok(()),
            Some(message) => match kind {
                "delete-path" | "create-directory" | "write-file" => {
                    Err(Error::Filesystem(message))
                }
                _ => Err(Error::ToolFailed {
                    tool: kind.to_string(),
                    code: Some(1),
                    stderr: message,
                }),
            },
        }
    }
}

fn fs_error(what: &str, path: &Path, e: io::Error) -> Error {
    Error::Filesystem(format!("{} '{}': {}", what, path.display(), e))
}

#[async_trait]
impl HostPrimitives for RecordingHost {
    async fn enable_package_channel(&self, channel: &str) -> Result<bool> {
        self.record(HostCall::EnablePackageChannel(channel.to_string()))?;
        Ok(self.packages.lock().channels.insert(channel.to_string()))
    }

    async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
        action: PackageAction,
    ) -> Result<bool> {
        self.record(HostCall::InstallPackage {
            name: name.to_string(),
            version: version.map(str::to_string),
            action,
        })?;
        Ok(self.packages.lock().installed.insert(name.to_string()))
    }

    async fn delete_path(&self, path: &Path) -> Result<bool> {
        self.record(HostCall::DeletePath(path.to_path_buf()))?;
        if std::fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir()) {
            return Err(Error::Filesystem(format!(
                "Refusing to delete '{}': it is a directory, not a file",
                path.display()
            )));
        }
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(fs_error("Cannot delete", path, e)),
        }
    }

    async fn create_directory(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<bool> {
        self.record(HostCall::CreateDirectory {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            group: group.to_string(),
            mode,
        })?;
        let created = !path.is_dir();
        std::fs::create_dir_all(path).map_err(|e| fs_error("Cannot create", path, e))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| fs_error("Cannot chmod", path, e))?;
        Ok(created)
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<bool> {
        self.record(HostCall::WriteFile {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            group: group.to_string(),
            mode,
        })?;
        let unchanged = std::fs::read(path).map(|c| c == contents).unwrap_or(false);
        if !unchanged {
            std::fs::write(path, contents).map_err(|e| fs_error("Cannot write", path, e))?;
        }
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| fs_error("Cannot chmod", path, e))?;
        Ok(!unchanged)
    }

    async fn run_shell(&self, command: &ShellCommand) -> Result<()> {
        self.record(HostCall::RunShell(command.script.clone()))?;

        let effects: Vec<PathBuf> = self
            .behaviour
            .lock()
            .shell_effects
            .iter()
            .filter(|e| command.script.contains(&e.needle))
            .map(|e| e.creates.clone())
            .collect();
        for path in effects {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| fs_error("Cannot create", parent, e))?;
            }
            std::fs::write(&path, b"").map_err(|e| fs_error("Cannot write", &path, e))?;
        }
        Ok(())
    }

    async fn spawn_daemon(&self, command: &ShellCommand) -> Result<Box<dyn DaemonHandle>> {
        self.record(HostCall::SpawnDaemon(command.script.clone()))?;

        let (listens, exits_early) = {
            let behaviour = self.behaviour.lock();
            (behaviour.daemon_listens, behaviour.daemon_exits_early)
        };

        let socket = daemon_socket(command);
        let listener = match (&socket, listens) {
            (Some(socket), true) => {
                // A stale socket from an earlier fake daemon would make bind fail
                let _ = std::fs::remove_file(socket);
                Some(UnixListener::bind(socket).map_err(|e| fs_error("Cannot bind", socket, e))?)
            }
            _ => None,
        };

        Ok(Box::new(RecordingDaemon {
            script: command.script.clone(),
            calls: Arc::clone(&self.calls),
            listener,
            socket,
            exited: exits_early,
        }))
    }

    async fn manage_service(
        &self,
        action: ServiceAction,
        service_name: &str,
        _init_script: &Path,
    ) -> Result<bool> {
        self.record(HostCall::ManageService {
            action,
            service_name: service_name.to_string(),
        })?;
        Ok(true)
    }
}

/// Socket path from the `--defaults-file` the daemon is started with.
fn daemon_socket(command: &ShellCommand) -> Option<PathBuf> {
    let (_, rest) = command.script.split_once("--defaults-file=")?;
    let config = std::fs::read_to_string(shell_word(rest)).ok()?;
    config
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "socket")
        .map(|(_, value)| PathBuf::from(value.trim()))
}

/// The leading shell word of `input`, with single and double quotes removed.
fn shell_word(input: &str) -> String {
    let mut word = String::new();
    let mut quote = None;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\\') => word.extend(chars.next()),
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, c) if c.is_whitespace() => break,
            (_, c) => word.push(c),
        }
    }
    word
}

struct RecordingDaemon {
    script: String,
    calls: Arc<Mutex<Vec<HostCall>>>,
    listener: Option<UnixListener>,
    socket: Option<PathBuf>,
    exited: bool,
}

#[async_trait]
impl DaemonHandle for RecordingDaemon {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_exited(&mut self) -> Result<Option<String>> {
        Ok(self.exited.then(|| "exit status: 1".to_string()))
    }

    async fn terminate(self: Box<Self>, _grace: Duration) -> Result<()> {
        let mut this = self;
        if let Some(listener) = this.listener.take() {
            drop(listener);
            if let Some(socket) = &this.socket {
                let _ = std::fs::remove_file(socket);
            }
        }
        this.calls.lock().push(HostCall::DaemonReaped(this.script.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_word_unquotes() {
        assert_eq!(shell_word("/etc/my.cnf --skip"), "/etc/my.cnf");
        assert_eq!(shell_word("'/srv/my data/my.cnf' --skip"), "/srv/my data/my.cnf");
        assert_eq!(shell_word("\"/a b\"/c d"), "/a b/c");
        assert_eq!(shell_word("'/it'\\''s/my.cnf'"), "/it's/my.cnf");
    }

    #[tokio::test]
    async fn test_delete_path_refuses_directories() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let legacy = dir.path().join("my.cnf");
        std::fs::create_dir(&legacy).unwrap();
        std::fs::write(legacy.join("important.cnf"), "[mysqld]\n").unwrap();

        let host = RecordingHost::new();
        assert!(matches!(
            host.delete_path(&legacy).await,
            Err(Error::Filesystem(_))
        ));
        assert!(legacy.join("important.cnf").exists());
    }

    #[tokio::test]
    async fn test_fake_daemon_binds_socket_from_quoted_defaults_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let etc = dir.path().join("my etc");
        std::fs::create_dir(&etc).unwrap();
        let socket = dir.path().join("mysqld.sock");
        let config = etc.join("my.cnf");
        std::fs::write(&config, format!("[mysqld]\nsocket = {}\n", socket.display())).unwrap();

        let host = RecordingHost::new();
        let daemon = host
            .spawn_daemon(&ShellCommand::new(format!(
                "exec /usr/sbin/mysqld --defaults-file='{}'",
                config.display()
            )))
            .await
            .unwrap();
        assert!(socket.exists());

        daemon.terminate(Duration::from_secs(1)).await.unwrap();
        assert!(!socket.exists());
    }
}
