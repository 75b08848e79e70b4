//! Error taxonomy for a provisioning run.
//!
//! Every variant is terminal: the orchestrator never retries locally, it
//! stops and leaves the host in a state that is safe to re-run from the top.

use std::path::PathBuf;

use thiserror::Error;

use super::exec::CommandError;

/// Which half of the backup step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    Dump,
    Compress,
}

impl std::fmt::Display for BackupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStage::Dump => f.write_str("dump"),
            BackupStage::Compress => f.write_str("compression"),
        }
    }
}

/// Service manager operation that was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    DaemonReload,
    Enable,
    Start,
    Restart,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceAction::DaemonReload => "daemon-reload",
            ServiceAction::Enable => "enable",
            ServiceAction::Start => "start",
            ServiceAction::Restart => "restart",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(
        "unsupported platform: distribution '{distribution}' release '{release}' ({architecture}); \
         add an entry to the profile table to support it"
    )]
    UnsupportedPlatform {
        distribution: String,
        release: String,
        architecture: String,
    },

    #[error("refusing to run as '{user}': run as the account that will own the allsky services")]
    PrivilegeViolation { user: String },

    #[error("failed to install {}: {reason}", path.display())]
    ResourceInstallFailure { path: PathBuf, reason: String },

    #[error("package installation failed: {0}")]
    PackageInstallFailure(#[source] CommandError),

    #[error("camera driver selection failed: {0}")]
    DriverSelection(String),

    #[error("web server configuration failed: {0}")]
    WebServerConfigFailure(#[source] CommandError),

    #[error("database backup {stage} failed for {}: {reason}", database.display())]
    BackupFailed {
        database: PathBuf,
        stage: BackupStage,
        reason: String,
    },

    #[error("migration generation failed: {0}")]
    MigrationGenerateFailed(#[source] CommandError),

    #[error("migration apply failed (restore from the pre-migration backup if needed): {0}")]
    MigrationApplyFailed(#[source] CommandError),

    #[error("service {unit} {action} failed: {reason}")]
    ServiceActivationFailure {
        unit: String,
        action: ServiceAction,
        reason: String,
    },
}

impl ProvisionError {
    /// Process exit status for this failure. Always non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::UnsupportedPlatform { .. } => 2,
            ProvisionError::PrivilegeViolation { .. } => 3,
            ProvisionError::ResourceInstallFailure { .. } => 4,
            ProvisionError::PackageInstallFailure(_) => 5,
            ProvisionError::DriverSelection(_) => 6,
            ProvisionError::WebServerConfigFailure(_) => 7,
            ProvisionError::BackupFailed { .. } => 8,
            ProvisionError::MigrationGenerateFailed(_) => 9,
            ProvisionError::MigrationApplyFailed(_) => 10,
            ProvisionError::ServiceActivationFailure { .. } => 11,
        }
    }

    pub(crate) fn resource(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        ProvisionError::ResourceInstallFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let errors = [
            ProvisionError::UnsupportedPlatform {
                distribution: "arch".into(),
                release: String::new(),
                architecture: "x86_64".into(),
            },
            ProvisionError::PrivilegeViolation { user: "root".into() },
            ProvisionError::resource("/tmp/x", "disk full"),
            ProvisionError::PackageInstallFailure(CommandError::failed("apt-get", Some(100), "")),
            ProvisionError::DriverSelection("none".into()),
            ProvisionError::WebServerConfigFailure(CommandError::failed("a2ensite", Some(1), "")),
            ProvisionError::BackupFailed {
                database: "/db".into(),
                stage: BackupStage::Dump,
                reason: "locked".into(),
            },
            ProvisionError::MigrationGenerateFailed(CommandError::failed("flask", Some(1), "")),
            ProvisionError::MigrationApplyFailed(CommandError::failed("flask", Some(1), "")),
            ProvisionError::ServiceActivationFailure {
                unit: "indiserver".into(),
                action: ServiceAction::Start,
                reason: "timeout".into(),
            },
        ];

        let mut codes: Vec<i32> = errors.iter().map(ProvisionError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn backup_failure_message_names_stage() {
        let err = ProvisionError::BackupFailed {
            database: "/var/lib/indi-allsky/indi-allsky.sqlite".into(),
            stage: BackupStage::Compress,
            reason: "No space left on device".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("compression"));
        assert!(msg.contains("indi-allsky.sqlite"));
    }
}
