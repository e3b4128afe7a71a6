//! Embedded template sources and the init-script lookup table.

use crate::config::PlatformFamily;

/// Variables every main-config template takes, no more and no fewer.
pub const MAIN_CONFIG_VARIABLES: &[&str] = &[
    "run_user",
    "data_dir",
    "pid_file",
    "socket_file",
    "port",
    "include_dir",
];

pub const INIT_SCRIPT_VARIABLES: &[&str] = &[
    "base_dir",
    "data_dir",
    "etc_dir",
    "local_service_name",
    "mysqld_safe_bin",
    "pid_file",
    "port",
    "run_user",
    "scl_name",
    "socket_file",
];

pub(super) struct TemplateSource {
    pub id: &'static str,
    pub body: &'static str,
    pub variables: &'static [&'static str],
}

pub(super) const TEMPLATES: &[TemplateSource] = &[
    TemplateSource {
        id: "5.0/my.cnf",
        body: include_str!("../../templates/5.0/my.cnf.tmpl"),
        variables: MAIN_CONFIG_VARIABLES,
    },
    TemplateSource {
        id: "5.1/my.cnf",
        body: include_str!("../../templates/5.1/my.cnf.tmpl"),
        variables: MAIN_CONFIG_VARIABLES,
    },
    TemplateSource {
        id: "5.5/my.cnf",
        body: include_str!("../../templates/5.5/my.cnf.tmpl"),
        variables: MAIN_CONFIG_VARIABLES,
    },
    TemplateSource {
        id: "5.6/my.cnf",
        body: include_str!("../../templates/5.6/my.cnf.tmpl"),
        variables: MAIN_CONFIG_VARIABLES,
    },
    TemplateSource {
        id: "sysvinit/rhel/mysqld",
        body: include_str!("../../templates/sysvinit/rhel/mysqld.tmpl"),
        variables: INIT_SCRIPT_VARIABLES,
    },
];

/// (mysql version, family, platform major) → init-script template.
pub(super) const INIT_SCRIPTS: &[(&str, PlatformFamily, u32, &str)] = &[
    ("5.0", PlatformFamily::Rhel, 5, "sysvinit/rhel/mysqld"),
    ("5.5", PlatformFamily::Rhel, 5, "sysvinit/rhel/mysqld"),
    ("5.1", PlatformFamily::Rhel, 6, "sysvinit/rhel/mysqld"),
    ("5.5", PlatformFamily::Rhel, 6, "sysvinit/rhel/mysqld"),
    ("5.6", PlatformFamily::Rhel, 6, "sysvinit/rhel/mysqld"),
    ("5.5", PlatformFamily::Rhel, 7, "sysvinit/rhel/mysqld"),
    ("5.6", PlatformFamily::Rhel, 7, "sysvinit/rhel/mysqld"),
];

pub(super) fn find(id: &str) -> Option<&'static TemplateSource> {
    TEMPLATES.iter().find(|t| t.id == id)
}
