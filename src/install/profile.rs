//! Installation profile resolution
//!
//! A static table keyed by exact `(distribution, release)` selects the
//! package set, repository directives and log ownership for the host.
//! There is no fallback entry: an unknown platform is fatal.

use std::collections::BTreeSet;
use std::path::Path;

use super::detection::PlatformIdentity;
use super::error::ProvisionError;

/// Family tag used for downstream branching (web server layout, package tool)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    DebianLike,
    RedhatLike,
}

/// Owner of the application log file; matches the syslog daemon's account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOwner {
    pub user: &'static str,
    pub group: &'static str,
}

/// How a repository directive registers its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryAction {
    /// `add-apt-repository <ppa>`
    Ppa(&'static str),
    /// Write an apt list file and import its signing key
    AptSource {
        list_file: &'static str,
        line: &'static str,
        key_url: &'static str,
    },
    /// Install a release package that drops a yum repo file
    RpmRelease(&'static str),
}

/// Extra repository registration, applied only when its condition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryDirective {
    pub name: &'static str,
    /// Architectures the directive applies to; empty means all
    pub architectures: &'static [&'static str],
    /// Any of these existing marks the directive as already satisfied
    pub skip_if_present: &'static [&'static str],
    pub action: RepositoryAction,
}

impl RepositoryDirective {
    /// Evaluate the guard. `exists` must only look, never mutate.
    pub fn applies(&self, platform: &PlatformIdentity, exists: impl Fn(&Path) -> bool) -> bool {
        let arch_matches = self.architectures.is_empty()
            || self.architectures.contains(&platform.architecture.as_str());

        arch_matches && !self.skip_if_present.iter().any(|p| exists(Path::new(p)))
    }
}

/// Resolved profile for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationProfile {
    pub os_family: OsFamily,
    pub packages: BTreeSet<String>,
    pub repositories: Vec<RepositoryDirective>,
    pub log_owner: LogOwner,
}

struct ProfileEntry {
    distribution: &'static str,
    release: &'static str,
    os_family: OsFamily,
    packages: &'static [&'static [&'static str]],
    repositories: &'static [RepositoryDirective],
    log_owner: LogOwner,
}

const SYSLOG_ADM: LogOwner = LogOwner { user: "syslog", group: "adm" };
const ROOT_ADM: LogOwner = LogOwner { user: "root", group: "adm" };
const ROOT_ROOT: LogOwner = LogOwner { user: "root", group: "root" };

const DEBIAN_COMMON: &[&str] = &[
    "apache2",
    "build-essential",
    "ffmpeg",
    "gifsicle",
    "git",
    "jq",
    "libcfitsio-dev",
    "libffi-dev",
    "libgnutls28-dev",
    "libjpeg-dev",
    "libopenblas-dev",
    "libssl-dev",
    "python3",
    "python3-dev",
    "python3-pip",
    "python3-venv",
    "rsyslog",
    "sqlite3",
    "swig",
    "virtualenv",
    "whiptail",
];

const DEBIAN_11_EXTRA: &[&str] = &["indi-full", "libgfortran5", "libindi-dev", "libnova-dev"];
const DEBIAN_10_EXTRA: &[&str] = &["indi-full", "libgfortran5", "libindi-dev", "libatlas-base-dev"];
const UBUNTU_EXTRA: &[&str] = &["indi-full", "libindi-dev", "gsc", "libgfortran5"];

const REDHAT_COMMON: &[&str] = &[
    "cfitsio-devel",
    "ffmpeg",
    "gcc",
    "git",
    "httpd",
    "jq",
    "libffi-devel",
    "libindi-devel",
    "mod_ssl",
    "openssl-devel",
    "python3",
    "python3-devel",
    "python3-pip",
    "rsyslog",
    "sqlite",
    "swig",
];

const UBUNTU_INDI_PPA: RepositoryDirective = RepositoryDirective {
    name: "indi-ppa",
    architectures: &["x86_64", "aarch64"],
    skip_if_present: &[
        "/usr/bin/indiserver",
        "/etc/apt/sources.list.d/mutlaqja-ubuntu-ppa-focal.list",
        "/etc/apt/sources.list.d/mutlaqja-ubuntu-ppa-jammy.list",
    ],
    action: RepositoryAction::Ppa("ppa:mutlaqja/ppa"),
};

const ASTROBERRY: RepositoryDirective = RepositoryDirective {
    name: "astroberry",
    architectures: &["armv7l", "aarch64"],
    skip_if_present: &["/etc/apt/sources.list.d/astroberry.list"],
    action: RepositoryAction::AptSource {
        list_file: "/etc/apt/sources.list.d/astroberry.list",
        line: "deb https://www.astroberry.io/repo/ buster main",
        key_url: "https://www.astroberry.io/repo/key",
    },
};

const EPEL: RepositoryDirective = RepositoryDirective {
    name: "epel",
    architectures: &[],
    skip_if_present: &["/etc/yum.repos.d/epel.repo"],
    action: RepositoryAction::RpmRelease("epel-release"),
};

const PROFILE_TABLE: &[ProfileEntry] = &[
    ProfileEntry {
        distribution: "raspbian",
        release: "11",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, DEBIAN_11_EXTRA],
        repositories: &[],
        log_owner: ROOT_ADM,
    },
    ProfileEntry {
        distribution: "raspbian",
        release: "10",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, DEBIAN_10_EXTRA],
        repositories: &[ASTROBERRY],
        log_owner: ROOT_ADM,
    },
    ProfileEntry {
        distribution: "debian",
        release: "11",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, DEBIAN_11_EXTRA],
        repositories: &[],
        log_owner: ROOT_ADM,
    },
    ProfileEntry {
        distribution: "debian",
        release: "10",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, DEBIAN_10_EXTRA],
        repositories: &[ASTROBERRY],
        log_owner: ROOT_ADM,
    },
    ProfileEntry {
        distribution: "ubuntu",
        release: "22.04",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, UBUNTU_EXTRA],
        repositories: &[UBUNTU_INDI_PPA],
        log_owner: SYSLOG_ADM,
    },
    ProfileEntry {
        distribution: "ubuntu",
        release: "20.04",
        os_family: OsFamily::DebianLike,
        packages: &[DEBIAN_COMMON, UBUNTU_EXTRA],
        repositories: &[UBUNTU_INDI_PPA],
        log_owner: SYSLOG_ADM,
    },
    ProfileEntry {
        distribution: "centos",
        release: "8",
        os_family: OsFamily::RedhatLike,
        packages: &[REDHAT_COMMON],
        repositories: &[EPEL],
        log_owner: ROOT_ROOT,
    },
];

/// Resolve the installation profile for `platform`.
///
/// Matching is exact on `(distribution, release)`; architecture only feeds
/// the repository directive guards evaluated later.
pub fn resolve(platform: &PlatformIdentity) -> Result<InstallationProfile, ProvisionError> {
    let entry = PROFILE_TABLE
        .iter()
        .find(|e| e.distribution == platform.distribution && e.release == platform.release)
        .ok_or_else(|| ProvisionError::UnsupportedPlatform {
            distribution: platform.distribution.clone(),
            release: platform.release.clone(),
            architecture: platform.architecture.clone(),
        })?;

    Ok(InstallationProfile {
        os_family: entry.os_family,
        packages: entry
            .packages
            .iter()
            .flat_map(|group| group.iter())
            .map(|p| p.to_string())
            .collect(),
        repositories: entry.repositories.to_vec(),
        log_owner: entry.log_owner,
    })
}

/// Every `(distribution, release)` pair the table knows about
pub fn supported_platforms() -> impl Iterator<Item = (&'static str, &'static str)> {
    PROFILE_TABLE.iter().map(|e| (e.distribution, e.release))
}
