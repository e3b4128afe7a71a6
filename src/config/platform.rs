//! Target platform declaration.
//!
//! Platform detection is left to the caller: the platform is declared in the
//! configuration file or overridden on the command line, and only classified
//! here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform families with distinct packaging and service conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    /// Red Hat derivatives (yum/rpm, sysvinit scripts under /etc/init.d)
    Rhel,
    /// Debian derivatives
    Debian,
    /// Anything else
    Unknown,
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::Rhel => write!(f, "rhel"),
            PlatformFamily::Debian => write!(f, "debian"),
            PlatformFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// Declared target platform, e.g. `centos` `7.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub version: String,
}

impl Platform {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn family(&self) -> PlatformFamily {
        match self.name.to_ascii_lowercase().as_str() {
            "centos" | "redhat" | "rhel" | "scientific" | "oracle" | "amazon" | "fedora" => {
                PlatformFamily::Rhel
            }
            "debian" | "ubuntu" | "linuxmint" | "raspbian" => PlatformFamily::Debian,
            _ => PlatformFamily::Unknown,
        }
    }

    /// Leading integer of the platform version ("7.0" → 7).
    pub fn major_version(&self) -> Result<u32> {
        self.version
            .trim()
            .split('.')
            .next()
            .and_then(|major| major.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::Validation(format!(
                    "Platform version '{}' does not start with a numeric major version",
                    self.version
                ))
            })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rhel_family_members() {
        for name in ["centos", "CentOS", "redhat", "amazon", "scientific"] {
            assert_eq!(Platform::new(name, "6.5").family(), PlatformFamily::Rhel);
        }
        assert_eq!(Platform::new("ubuntu", "14.04").family(), PlatformFamily::Debian);
        assert_eq!(Platform::new("smartos", "5.11").family(), PlatformFamily::Unknown);
    }

    #[test]
    fn test_major_version() {
        assert_eq!(Platform::new("centos", "7.0").major_version().unwrap(), 7);
        assert_eq!(Platform::new("centos", "6").major_version().unwrap(), 6);
        assert!(Platform::new("centos", "seven").major_version().is_err());
    }
}
