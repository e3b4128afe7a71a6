//! Template rendering.
//!
//! Rendering is a pure function of a template id and a variable set.
//! Templates use `{{name}}` placeholders and each declares the exact variable
//! set it accepts: a missing, undeclared, or unexpected variable is a
//! configuration error rather than a blank substitution.
//!
//! Init scripts are chosen from a lookup table keyed by mysql version,
//! platform family and platform major version. A key with no entry fails
//! instead of falling back to a default script.

mod catalog;

pub use catalog::{INIT_SCRIPT_VARIABLES, MAIN_CONFIG_VARIABLES};

use crate::config::PlatformFamily;
use crate::context::InstanceContext;
use crate::error::{Error, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Variable set passed to a template.
pub type Variables = BTreeMap<String, String>;

/// Global template regex compiled once
static TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_template_regex() -> &'static Regex {
    TEMPLATE_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup key for init-script selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScriptKey {
    pub version: String,
    pub family: PlatformFamily,
    pub platform_major: u32,
    /// Full platform version, for error reporting only.
    pub platform_version: String,
}

impl InitScriptKey {
    pub fn for_context(ctx: &InstanceContext) -> Self {
        Self {
            version: ctx.version.clone(),
            family: ctx.family,
            platform_major: ctx.platform_major,
            platform_version: ctx.platform.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Main configuration template for a mysql version.
    pub fn main_config(&self, version: &str) -> Result<TemplateId> {
        let id = format!("{}/my.cnf", version);
        if catalog::find(&id).is_none() {
            return Err(Error::Config(format!(
                "No main configuration template for mysql {}",
                version
            )));
        }
        Ok(TemplateId(id))
    }

    /// Init script for a (version, family, platform major) combination.
    pub fn init_script(&self, key: &InitScriptKey) -> Result<TemplateId> {
        catalog::INIT_SCRIPTS
            .iter()
            .find(|(version, family, major, _)| {
                *version == key.version && *family == key.family && *major == key.platform_major
            })
            .map(|(_, _, _, id)| TemplateId(id.to_string()))
            .ok_or_else(|| Error::UnsupportedPlatform {
                version: key.version.clone(),
                family: key.family.to_string(),
                platform_version: key.platform_version.clone(),
            })
    }

    /// Variables a template accepts.
    pub fn variables(&self, id: &TemplateId) -> Result<&'static [&'static str]> {
        catalog::find(id.as_str())
            .map(|t| t.variables)
            .ok_or_else(|| Error::UnknownTemplate(id.to_string()))
    }

    /// Check a variable set against the template without rendering.
    pub fn check(&self, id: &TemplateId, variables: &Variables) -> Result<()> {
        let accepted = self.variables(id)?;

        for name in accepted {
            if !variables.contains_key(*name) {
                return Err(Error::MissingTemplateVariable {
                    template: id.to_string(),
                    variable: name.to_string(),
                });
            }
        }

        if let Some(extra) = variables.keys().find(|k| !accepted.contains(&k.as_str())) {
            return Err(Error::UnexpectedTemplateVariable {
                template: id.to_string(),
                variable: extra.clone(),
            });
        }

        Ok(())
    }

    pub fn render(&self, id: &TemplateId, variables: &Variables) -> Result<Vec<u8>> {
        self.check(id, variables)?;
        let source = catalog::find(id.as_str()).ok_or_else(|| Error::UnknownTemplate(id.to_string()))?;

        let regex = get_template_regex();
        if let Some(undefined) = regex
            .captures_iter(source.body)
            .map(|cap| cap[1].to_string())
            .find(|name| !variables.contains_key(name))
        {
            return Err(Error::MissingTemplateVariable {
                template: id.to_string(),
                variable: undefined,
            });
        }

        let rendered = regex.replace_all(source.body, |cap: &Captures<'_>| {
            variables.get(&cap[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned().into_bytes())
    }
}

/// Variables for the main configuration file.
pub fn main_config_variables(ctx: &InstanceContext) -> Variables {
    [
        ("run_user", ctx.run_user.clone()),
        ("data_dir", ctx.data_dir.display().to_string()),
        ("pid_file", ctx.pid_file.display().to_string()),
        ("socket_file", ctx.socket_file.display().to_string()),
        ("port", ctx.port.to_string()),
        ("include_dir", ctx.include_dir.display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Variables for the sysvinit script.
pub fn init_script_variables(ctx: &InstanceContext) -> Variables {
    [
        ("base_dir", ctx.base_dir.display().to_string()),
        ("data_dir", ctx.data_dir.display().to_string()),
        ("etc_dir", ctx.etc_dir.display().to_string()),
        ("local_service_name", ctx.service_name.clone()),
        ("mysqld_safe_bin", ctx.binaries.mysqld_safe.display().to_string()),
        ("pid_file", ctx.pid_file.display().to_string()),
        ("port", ctx.port.to_string()),
        ("run_user", ctx.run_user.clone()),
        ("scl_name", ctx.scl_name.clone().unwrap_or_default()),
        ("socket_file", ctx.socket_file.display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
