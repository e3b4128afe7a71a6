//! Derived, read-only parameters for one instance.
//!
//! An [`InstanceContext`] is computed once per run from a [`ServiceInstance`],
//! the declared [`Platform`] and the configured [`Roots`], and then passed by
//! reference to the planner, the renderer and the executor. Nothing in it can
//! be set independently: every path is a function of the instance name, the
//! base directory of the package build, and the roots.

mod catalog;

pub use catalog::{package_source, PackageSource};

use crate::config::{
    Config, PackageAction, Platform, PlatformFamily, Roots, ServiceInstance,
};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory mysql_install_db creates inside the data directory.
pub const ENGINE_SCHEMA: &str = "mysql";

/// Name of the completion marker written after the first-boot grant.
pub const FIRST_CONVERGE_MARKER: &str = ".first_converge";

/// Locations of the database binaries for this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binaries {
    pub mysqld: PathBuf,
    pub mysqld_safe: PathBuf,
    pub mysql: PathBuf,
    pub mysql_install_db: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceContext {
    pub name: String,
    /// OS service name, `mysql-<name>`.
    pub service_name: String,
    pub version: String,
    pub platform: Platform,
    pub family: PlatformFamily,
    pub platform_major: u32,

    /// `None` when neither the catalog nor the instance names a package.
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub package_action: PackageAction,
    pub package_channel: Option<String>,
    pub scl_name: Option<String>,

    pub port: u16,
    pub run_user: String,
    pub run_group: String,

    /// Prefix of the package build; empty for builds installed under `/`.
    pub base_dir: PathBuf,
    pub etc_dir: PathBuf,
    pub include_dir: PathBuf,
    pub run_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config_file: PathBuf,
    pub pid_file: PathBuf,
    pub socket_file: PathBuf,
    pub init_script: PathBuf,

    /// Global config files mysqld reads unconditionally.
    pub legacy_config_files: [PathBuf; 2],
    /// Produced by mysql_install_db; its presence means the data dir is initialized.
    pub data_marker: PathBuf,
    /// Written as the last act of the first-boot grant.
    pub first_converge_marker: PathBuf,

    pub binaries: Binaries,
}

impl InstanceContext {
    pub fn derive(instance: &ServiceInstance, platform: &Platform, roots: &Roots) -> Result<Self> {
        let family = platform.family();
        let platform_major = platform.major_version()?;
        let source = package_source(&instance.version, family, platform_major);

        let service_name = format!("mysql-{}", instance.name);
        let scl_name = source.and_then(|s| s.scl).map(str::to_string);
        let base_dir = match &scl_name {
            Some(scl) => PathBuf::from("/opt/rh").join(scl).join("root"),
            None => PathBuf::new(),
        };

        let etc_dir = rebase(&base_dir, &roots.etc).join(&service_name);
        let include_dir = etc_dir.join("conf.d");
        let run_dir = rebase(&base_dir, &roots.run).join(&service_name);
        let log_dir = rebase(&base_dir, &roots.log).join(&service_name);
        let data_dir = roots.data.join(&service_name);

        let libexec_daemon = source.map(|s| s.libexec_daemon).unwrap_or(false);
        let binaries = Binaries {
            mysqld: rebase(
                &base_dir,
                Path::new(if libexec_daemon {
                    "/usr/libexec/mysqld"
                } else {
                    "/usr/sbin/mysqld"
                }),
            ),
            mysqld_safe: rebase(&base_dir, Path::new("/usr/bin/mysqld_safe")),
            mysql: rebase(&base_dir, Path::new("/usr/bin/mysql")),
            mysql_install_db: rebase(&base_dir, Path::new("/usr/bin/mysql_install_db")),
        };

        Ok(Self {
            name: instance.name.clone(),
            version: instance.version.clone(),
            platform: platform.clone(),
            family,
            platform_major,
            package_name: instance
                .package_name
                .clone()
                .or_else(|| source.map(|s| s.package_name.to_string())),
            package_version: instance.package_version.clone(),
            package_action: instance.package_action,
            package_channel: source.and_then(|s| s.channel).map(str::to_string),
            scl_name,
            port: instance.port,
            run_user: instance.run_user.clone(),
            run_group: instance.run_group.clone(),
            config_file: etc_dir.join("my.cnf"),
            pid_file: run_dir.join(format!("{}.pid", service_name)),
            socket_file: run_dir.join(format!("{}.sock", service_name)),
            init_script: roots.init.join(&service_name),
            legacy_config_files: [roots.etc.join("mysql").join("my.cnf"), roots.etc.join("my.cnf")],
            data_marker: data_dir.join(ENGINE_SCHEMA).join("user.frm"),
            first_converge_marker: etc_dir.join(FIRST_CONVERGE_MARKER),
            service_name,
            base_dir,
            etc_dir,
            include_dir,
            run_dir,
            data_dir,
            log_dir,
            binaries,
        })
    }

    /// Paths this instance owns exclusively; two instances sharing any of
    /// them would overwrite each other.
    pub fn owned_paths(&self) -> Vec<&Path> {
        vec![
            self.etc_dir.as_path(),
            self.include_dir.as_path(),
            self.run_dir.as_path(),
            self.data_dir.as_path(),
            self.log_dir.as_path(),
            self.config_file.as_path(),
            self.pid_file.as_path(),
            self.socket_file.as_path(),
            self.init_script.as_path(),
        ]
    }
}

/// Derive contexts for the named instances and reject any two that would
/// share a port or an owned path.
pub fn derive_contexts(config: &Config, names: &[String]) -> Result<Vec<InstanceContext>> {
    let mut contexts = Vec::with_capacity(names.len());
    for name in names {
        let spec = config
            .instances
            .get(name)
            .ok_or_else(|| Error::InstanceNotFound(name.clone()))?;
        let instance = ServiceInstance::resolve(name, spec, &config.platform)?;
        contexts.push(InstanceContext::derive(&instance, &config.platform, &config.roots)?);
    }
    ensure_disjoint(&contexts)?;
    Ok(contexts)
}

/// Reject contexts that collide on port or on any owned path.
pub fn ensure_disjoint(contexts: &[InstanceContext]) -> Result<()> {
    let mut ports: HashMap<u16, &str> = HashMap::new();
    let mut paths: HashMap<&Path, &str> = HashMap::new();

    for ctx in contexts {
        if let Some(other) = ports.insert(ctx.port, &ctx.name) {
            if other != ctx.name {
                return Err(Error::AllocationConflict {
                    resource: format!("port {}", ctx.port),
                    first: other.to_string(),
                    second: ctx.name.clone(),
                });
            }
        }
        for path in ctx.owned_paths() {
            if let Some(other) = paths.insert(path, &ctx.name) {
                if other != ctx.name {
                    return Err(Error::AllocationConflict {
                        resource: format!("path {}", path.display()),
                        first: other.to_string(),
                        second: ctx.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn rebase(base: &Path, path: &Path) -> PathBuf {
    if base.as_os_str().is_empty() {
        return path.to_path_buf();
    }
    base.join(path.strip_prefix("/").unwrap_or(path))
}
