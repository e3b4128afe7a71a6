//! Packaging facts per (mysql version, platform family, platform major).

use crate::config::PlatformFamily;

/// Where a version comes from on a given platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageSource {
    pub package_name: &'static str,
    /// Package channel that must be enabled before installing.
    pub channel: Option<&'static str>,
    /// Software collection wrapping the binaries (`scl enable <name>`).
    pub scl: Option<&'static str>,
    /// Whether mysqld lives in libexec (distribution builds) or sbin (community builds).
    pub libexec_daemon: bool,
}

const RHEL_PACKAGES: &[(&str, u32, PackageSource)] = &[
    (
        "5.0",
        5,
        PackageSource {
            package_name: "mysql-server",
            channel: None,
            scl: None,
            libexec_daemon: true,
        },
    ),
    (
        "5.5",
        5,
        PackageSource {
            package_name: "mysql55-mysql-server",
            channel: None,
            scl: Some("mysql55"),
            libexec_daemon: true,
        },
    ),
    (
        "5.1",
        6,
        PackageSource {
            package_name: "mysql-server",
            channel: None,
            scl: None,
            libexec_daemon: true,
        },
    ),
    (
        "5.5",
        6,
        PackageSource {
            package_name: "mysql-community-server",
            channel: Some("mysql55-community"),
            scl: None,
            libexec_daemon: false,
        },
    ),
    (
        "5.6",
        6,
        PackageSource {
            package_name: "mysql-community-server",
            channel: Some("mysql56-community"),
            scl: None,
            libexec_daemon: false,
        },
    ),
    (
        "5.5",
        7,
        PackageSource {
            package_name: "mysql-community-server",
            channel: Some("mysql55-community"),
            scl: None,
            libexec_daemon: false,
        },
    ),
    (
        "5.6",
        7,
        PackageSource {
            package_name: "mysql-community-server",
            channel: Some("mysql56-community"),
            scl: None,
            libexec_daemon: false,
        },
    ),
];

pub fn package_source(
    version: &str,
    family: PlatformFamily,
    platform_major: u32,
) -> Option<PackageSource> {
    match family {
        PlatformFamily::Rhel => RHEL_PACKAGES
            .iter()
            .find(|(v, major, _)| *v == version && *major == platform_major)
            .map(|(_, _, source)| *source),
        PlatformFamily::Debian | PlatformFamily::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_el7_community_package() {
        let source = package_source("5.6", PlatformFamily::Rhel, 7).unwrap();
        assert_eq!(source.package_name, "mysql-community-server");
        assert_eq!(source.channel, Some("mysql56-community"));
        assert_eq!(source.scl, None);
    }

    #[test]
    fn test_el5_uses_software_collection_without_channel() {
        let source = package_source("5.5", PlatformFamily::Rhel, 5).unwrap();
        assert_eq!(source.scl, Some("mysql55"));
        assert_eq!(source.channel, None);
    }

    #[test]
    fn test_unknown_combinations() {
        assert!(package_source("5.6", PlatformFamily::Rhel, 5).is_none());
        assert!(package_source("5.6", PlatformFamily::Debian, 7).is_none());
    }
}
