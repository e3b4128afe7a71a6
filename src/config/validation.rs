use super::{Config, ServiceInstance};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

impl Config {
    /// Validate the configuration.
    ///
    /// Checks everything that can be decided from the file alone. Derived path
    /// collisions are checked again when instance contexts are built.
    pub fn validate(&self) -> Result<()> {
        self.platform.major_version()?;

        if self.instances.is_empty() {
            return Err(Error::Validation(
                "No instances declared. Add at least one entry under 'instances:'".to_string(),
            ));
        }

        let mut ports: HashMap<u16, &str> = HashMap::new();
        for (name, spec) in &self.instances {
            ServiceInstance::resolve(name, spec, &self.platform)?;

            if spec.port == 0 {
                return Err(Error::Validation(format!(
                    "Instance '{}' has port 0; choose a fixed TCP port",
                    name
                )));
            }

            if spec.run_user.trim().is_empty() || spec.run_group.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "Instance '{}' needs a non-empty run_user and run_group",
                    name
                )));
            }

            if let Some(pkg) = &spec.package_name {
                if pkg.trim().is_empty() || pkg.chars().any(char::is_whitespace) {
                    return Err(Error::Validation(format!(
                        "Instance '{}' has invalid package_name '{}'",
                        name, pkg
                    )));
                }
            }

            if let Some(previous) = ports.insert(spec.port, name) {
                return Err(Error::AllocationConflict {
                    resource: format!("port {}", spec.port),
                    first: previous.to_string(),
                    second: name.clone(),
                });
            }
        }

        for (label, value) in [
            ("shell", self.timeouts.shell),
            ("daemon_startup", self.timeouts.daemon_startup),
        ] {
            if value == Duration::ZERO {
                return Err(Error::Validation(format!(
                    "timeouts.{} must be greater than zero",
                    label
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, InstanceSpec, Platform};
    use crate::error::Error;

    fn config_with(instances: &[(&str, InstanceSpec)]) -> Config {
        let mut config = Config::new(Platform::new("centos", "7.0"));
        for (name, spec) in instances {
            config.instances.insert(name.to_string(), spec.clone());
        }
        config
    }

    #[test]
    fn test_valid_config() {
        let config = config_with(&[("default", InstanceSpec::default())]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_instances() {
        let config = config_with(&[]);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_duplicate_ports() {
        let config = config_with(&[
            ("default", InstanceSpec::default()),
            ("replica", InstanceSpec::default()),
        ]);
        match config.validate() {
            Err(Error::AllocationConflict {
                resource,
                first,
                second,
            }) => {
                assert_eq!(resource, "port 3306");
                assert_eq!(first, "default");
                assert_eq!(second, "replica");
            }
            other => panic!("expected allocation conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_names_and_users() {
        let config = config_with(&[("bad/name", InstanceSpec::default())]);
        assert!(config.validate().is_err());

        let spec = InstanceSpec {
            run_user: " ".to_string(),
            ..InstanceSpec::default()
        };
        let config = config_with(&[("default", spec)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_startup_timeout() {
        let mut config = config_with(&[("default", InstanceSpec::default())]);
        config.timeouts.daemon_startup = std::time::Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
