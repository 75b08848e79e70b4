//! Platform detection
//!
//! Identifies the distribution, release and CPU architecture of the host.
//! Detection is a pure read: fields the host does not report come back as
//! empty strings and are left for the profile resolver to reject.

use std::fmt;
use std::path::Path;

use once_cell::sync::OnceCell;

const OS_RELEASE: &str = "/etc/os-release";

/// Host identity, captured once at the start of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub distribution: String,
    pub release: String,
    pub architecture: String,
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<PlatformIdentity> = OnceCell::new();

impl PlatformIdentity {
    pub fn new(distribution: &str, release: &str, architecture: &str) -> Self {
        Self {
            distribution: distribution.to_string(),
            release: release.to_string(),
            architecture: architecture.to_string(),
        }
    }

    /// Detect current platform (cached after first call)
    pub fn detect() -> &'static PlatformIdentity {
        PLATFORM_CACHE.get_or_init(|| Self::detect_from(Path::new(OS_RELEASE), &machine()))
    }

    /// Build an identity from an os-release file and a `uname -m` style string
    pub fn detect_from(os_release: &Path, architecture: &str) -> Self {
        let content = match std::fs::read_to_string(os_release) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Unable to read {}: {e}", os_release.display());
                String::new()
            }
        };

        Self {
            distribution: os_release_value(&content, "ID").to_ascii_lowercase(),
            release: os_release_value(&content, "VERSION_ID"),
            architecture: architecture.to_string(),
        }
    }
}

impl fmt::Display for PlatformIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.distribution, self.release, self.architecture)
    }
}

/// Machine hardware name as reported by uname(2)
fn machine() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => uts.machine().to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("uname failed: {e}");
            String::new()
        }
    }
}

/// Extract `KEY=value` from os-release content, stripping optional quotes
fn os_release_value(content: &str, key: &str) -> String {
    content
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .unwrap_or_default()
}
