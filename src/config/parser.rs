use super::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "mysql-service.yaml";
const ALT_CONFIG_FILE_NAME: &str = "mysql-service.yml";

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        for name in [CONFIG_FILE_NAME, ALT_CONFIG_FILE_NAME] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        match dir.parent() {
            Some(parent) => Self::find_config_in_dir(parent),
            None => Err(Error::Config(format!(
                "Could not find {} in current directory or any parent",
                CONFIG_FILE_NAME
            ))),
        }
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse config from YAML string
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Parse(format!("Failed to parse YAML config: {}", e)))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageAction;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
platform:
  name: centos
  version: "7.0"

instances:
  default:
    version: "5.6"
"#;

        let config = Parser::new().parse_config(yaml).unwrap();

        assert_eq!(config.platform.name, "centos");
        assert_eq!(config.instances.len(), 1);
        let spec = &config.instances["default"];
        assert_eq!(spec.version.as_deref(), Some("5.6"));
        assert_eq!(spec.port, 3306);
        assert_eq!(spec.package_action, PackageAction::Install);
        assert_eq!(config.roots.etc, PathBuf::from("/etc"));
        assert_eq!(config.timeouts.daemon_startup, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_roots_and_timeouts() {
        let yaml = r#"
platform:
  name: centos
  version: "6.5"
roots:
  etc: /sandbox/etc
timeouts:
  shell: 2m
  daemon_startup: 500ms
  daemon_grace: 3
instances:
  analytics:
    port: 3307
    package_action: upgrade
"#;

        let config = Parser::new().parse_config(yaml).unwrap();

        assert_eq!(config.roots.etc, PathBuf::from("/sandbox/etc"));
        assert_eq!(config.roots.run, PathBuf::from("/var/run"));
        assert_eq!(config.timeouts.shell, Duration::from_secs(120));
        assert_eq!(config.timeouts.daemon_startup, Duration::from_millis(500));
        assert_eq!(config.timeouts.daemon_grace, Duration::from_secs(3));
        assert_eq!(
            config.instances["analytics"].package_action,
            PackageAction::Upgrade
        );
    }

    #[test]
    fn test_parse_rejects_bad_duration() {
        let yaml = r#"
platform: { name: centos, version: "7.0" }
timeouts:
  shell: forever
"#;
        assert!(matches!(
            Parser::new().parse_config(yaml),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "platform: { name: centos, version: \"7.0\" }\n",
        )
        .unwrap();

        let found = Parser::find_config_in_dir(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }
}
