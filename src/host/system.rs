use super::{DaemonHandle, HostPrimitives};
use crate::config::{PackageAction, Timeouts};
use crate::error::{validate_pid, Error, Result};
use crate::plan::{ServiceAction, ShellCommand};
use async_trait::async_trait;
use nix::sys::signal::{self, killpg, Signal};
use nix::unistd::{Gid, Group, Uid, User};
use std::ffi::OsString;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

/// The real host: yum and rpm for packages, sysvinit scripts for services.
pub struct SystemHost {
    timeouts: Timeouts,
    tool_path: Option<OsString>,
}

impl SystemHost {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            tool_path: None,
        }
    }

    /// Override `PATH` for package tools (rpm, yum, yum-config-manager).
    pub fn with_tool_path(mut self, path: impl Into<OsString>) -> Self {
        self.tool_path = Some(path.into());
        self
    }

    async fn run_tool(&self, tool: &str, args: &[&str]) -> Result<Output> {
        tracing::debug!("Running {} {}", tool, args.join(" "));

        let mut cmd = Command::new(tool);
        if let Some(path) = &self.tool_path {
            cmd.env("PATH", path);
        }
        let child = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ToolInvocation {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(self.timeouts.shell, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::ToolInvocation {
                tool: tool.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::Timeout {
                what: format!("{} {}", tool, args.join(" ")),
                after: self.timeouts.shell,
            }),
        }
    }

    /// Run a tool and fail on non-zero exit.
    async fn run_checked(&self, tool: &str, args: &[&str]) -> Result<Output> {
        let output = self.run_tool(tool, args).await?;
        if !output.status.success() {
            return Err(tool_failed(tool, &output));
        }
        Ok(output)
    }

    async fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .run_tool("rpm", &["-q", "--qf", "%{VERSION}-%{RELEASE}", name])
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn shell(&self, command: &ShellCommand) -> Result<Command> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command.script).stdin(Stdio::null());

        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        if let Some(user) = &command.user {
            let (uid, gid) = resolve_ownership(user, command.group.as_deref().unwrap_or(user))?;
            if Uid::effective().is_root() {
                cmd.uid(uid.as_raw()).gid(gid.as_raw());
            } else if Uid::effective() != uid {
                tracing::warn!(
                    "Not running as root; '{}' runs as the current user instead of {}",
                    command.script,
                    user
                );
            }
        }

        Ok(cmd)
    }
}

fn tool_failed(tool: &str, output: &Output) -> Error {
    Error::ToolFailed {
        tool: tool.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn resolve_ownership(owner: &str, group: &str) -> Result<(Uid, Gid)> {
    let user = User::from_name(owner)
        .map_err(|e| Error::Config(format!("Cannot look up user '{}': {}", owner, e)))?
        .ok_or_else(|| Error::Config(format!("User '{}' does not exist", owner)))?;
    let group = Group::from_name(group)
        .map_err(|e| Error::Config(format!("Cannot look up group '{}': {}", group, e)))?
        .ok_or_else(|| Error::Config(format!("Group '{}' does not exist", group)))?;
    Ok((user.uid, group.gid))
}

/// Apply owner, group and mode; returns whether anything changed.
fn enforce_attributes(path: &Path, owner: &str, group: &str, mode: u32) -> Result<bool> {
    let (uid, gid) = resolve_ownership(owner, group)?;
    let fs_err =
        |what: &str, e: io::Error| Error::Filesystem(format!("{} '{}': {}", what, path.display(), e));

    let meta = std::fs::symlink_metadata(path).map_err(|e| fs_err("Cannot stat", e))?;
    let mut changed = false;

    if meta.uid() != uid.as_raw() || meta.gid() != gid.as_raw() {
        nix::unistd::chown(path, Some(uid), Some(gid))
            .map_err(|e| fs_err("Cannot chown", io::Error::from(e)))?;
        changed = true;
    }

    if meta.mode() & 0o7777 != mode {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| fs_err("Cannot chmod", e))?;
        changed = true;
    }

    Ok(changed)
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Filesystem(format!("'{}' has no parent", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::Filesystem(format!("Cannot stage '{}': {}", path.display(), e)))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::Filesystem(format!("Cannot write '{}': {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| Error::Filesystem(format!("Cannot replace '{}': {}", path.display(), e)))?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Filesystem(format!("Filesystem task failed: {}", e)))?
}

#[async_trait]
impl HostPrimitives for SystemHost {
    async fn enable_package_channel(&self, channel: &str) -> Result<bool> {
        let enabled = self.run_checked("yum", &["-q", "repolist", "enabled"]).await?;
        // Repo ids may carry a "/$basearch" suffix
        let listed = String::from_utf8_lossy(&enabled.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .any(|id| id.split('/').next() == Some(channel));
        if listed {
            return Ok(false);
        }

        self.run_checked("yum-config-manager", &["--enable", channel])
            .await?;
        tracing::info!("Enabled package channel {}", channel);
        Ok(true)
    }

    async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
        action: PackageAction,
    ) -> Result<bool> {
        let before = self.installed_version(name).await?;
        let wanted = match version {
            Some(v) => format!("{}-{}", name, v),
            None => name.to_string(),
        };

        match action {
            PackageAction::Install => {
                let satisfied = match (&before, version) {
                    (Some(_), None) => true,
                    (Some(installed), Some(v)) => version_satisfies(installed, v),
                    (None, _) => false,
                };
                if satisfied {
                    return Ok(false);
                }
                self.run_checked("yum", &["-y", "-q", "install", &wanted])
                    .await?;
            }
            PackageAction::Upgrade => {
                let verb = if before.is_some() { "upgrade" } else { "install" };
                self.run_checked("yum", &["-y", "-q", verb, &wanted]).await?;
            }
        }

        let after = self.installed_version(name).await?;
        Ok(after != before)
    }

    async fn delete_path(&self, path: &Path) -> Result<bool> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(Error::Filesystem(format!(
                    "Cannot stat '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        if meta.is_dir() {
            return Err(Error::Filesystem(format!(
                "Refusing to delete '{}': it is a directory, not a file",
                path.display()
            )));
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Filesystem(format!(
                "Cannot delete '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn create_directory(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<bool> {
        let path = path.to_path_buf();
        let (owner, group) = (owner.to_string(), group.to_string());
        blocking(move || {
            let created = !path.is_dir();
            if created {
                std::fs::create_dir_all(&path).map_err(|e| {
                    Error::Filesystem(format!("Cannot create '{}': {}", path.display(), e))
                })?;
            }
            Ok(enforce_attributes(&path, &owner, &group, mode)? || created)
        })
        .await
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<bool> {
        let path = path.to_path_buf();
        let contents = contents.to_vec();
        let (owner, group) = (owner.to_string(), group.to_string());
        blocking(move || {
            let current = match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(Error::Filesystem(format!(
                        "Cannot read '{}': {}",
                        path.display(),
                        e
                    )))
                }
            };
            let rewrite = current.as_deref() != Some(contents.as_slice());
            if rewrite {
                write_atomically(&path, &contents)?;
            }
            Ok(enforce_attributes(&path, &owner, &group, mode)? || rewrite)
        })
        .await
    }

    async fn run_shell(&self, command: &ShellCommand) -> Result<()> {
        let output = self
            .shell(command)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ToolInvocation {
                tool: "sh".to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(tool_failed(&command.script, &output));
        }
        Ok(())
    }

    async fn spawn_daemon(&self, command: &ShellCommand) -> Result<Box<dyn DaemonHandle>> {
        let child = self
            .shell(command)?
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Backstop only; terminate() is the normal release path
            .kill_on_drop(true)
            .process_group(0)
            .spawn()
            .map_err(|e| Error::ToolInvocation {
                tool: command.script.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Spawned transient daemon (pid {:?})", child.id());
        Ok(Box::new(SystemDaemon {
            child,
            name: command.script.clone(),
        }))
    }

    async fn manage_service(
        &self,
        action: ServiceAction,
        service_name: &str,
        init_script: &Path,
    ) -> Result<bool> {
        let script = init_script.to_string_lossy().into_owned();
        match action {
            ServiceAction::Start => {
                let status = self.run_tool(&script, &["status"]).await?;
                if status.status.success() {
                    tracing::debug!("Service {} already running", service_name);
                    return Ok(false);
                }
                self.run_checked(&script, &["start"]).await?;
                Ok(true)
            }
        }
    }
}

struct SystemDaemon {
    child: Child,
    name: String,
}

#[async_trait]
impl DaemonHandle for SystemDaemon {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exited(&mut self) -> Result<Option<String>> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| s.to_string()))
            .map_err(|e| Error::ToolInvocation {
                tool: self.name.clone(),
                reason: e.to_string(),
            })
    }

    async fn terminate(self: Box<Self>, grace: Duration) -> Result<()> {
        let mut this = self;
        let Some(raw_pid) = this.child.id() else {
            // Already reaped by try_exited
            return Ok(());
        };
        let pid = validate_pid(raw_pid, &this.name)?;

        // The daemon leads its own process group; signal the whole group
        if killpg(pid, Signal::SIGTERM)
            .or_else(|_| signal::kill(pid, Signal::SIGTERM))
            .is_err()
        {
            tracing::debug!("Daemon {} already gone before SIGTERM", raw_pid);
        }

        match tokio::time::timeout(grace, this.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Transient daemon exited: {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::ToolInvocation {
                tool: this.name.clone(),
                reason: format!("failed to reap daemon: {}", e),
            }),
            Err(_) => {
                tracing::warn!(
                    "Transient daemon {} did not exit after SIGTERM (grace period: {:?}), sending SIGKILL",
                    raw_pid,
                    grace
                );
                let _ = killpg(pid, Signal::SIGKILL).or_else(|_| signal::kill(pid, Signal::SIGKILL));
                this.child
                    .wait()
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::ToolInvocation {
                        tool: this.name.clone(),
                        reason: format!("failed to reap daemon: {}", e),
                    })
            }
        }
    }
}

/// A pin matches the installed `VERSION-RELEASE` exactly or its `VERSION` part.
fn version_satisfies(installed: &str, pin: &str) -> bool {
    installed == pin || installed.split_once('-').map(|(version, _)| version) == Some(pin)
}
