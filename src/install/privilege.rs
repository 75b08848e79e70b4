//! Invoking-user checks
//!
//! The run must be started by the account that will own the allsky user
//! services, never by root. Root-only steps are escalated per command with
//! `sudo` instead.

use anyhow::{Context, Result};
use nix::unistd::{Group, Uid, User};

use super::error::ProvisionError;

/// Identity of the account that launched the provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub name: String,
    /// Primary group
    pub group: String,
    pub uid: u32,
}

impl InvokingUser {
    pub fn new(name: &str, group: &str, uid: u32) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            uid,
        }
    }

    /// Read the real uid of this process and resolve its account name
    pub fn current() -> Result<Self> {
        let uid = nix::unistd::getuid();
        let user = User::from_uid(uid)
            .context("Failed to look up the invoking user")?
            .ok_or_else(|| anyhow::anyhow!("uid {uid} has no passwd entry"))?;

        let group = Group::from_gid(user.gid)
            .context("Failed to look up the invoking user's group")?
            .map(|g| g.name)
            .unwrap_or_else(|| user.gid.to_string());

        Ok(Self {
            name: user.name,
            group,
            uid: uid.as_raw(),
        })
    }

    fn is_root(&self) -> bool {
        Uid::from_raw(self.uid).is_root() || self.name == "root"
    }
}

/// Reject privileged invocation
pub fn check_invoking_user(user: &InvokingUser) -> Result<(), ProvisionError> {
    if user.is_root() {
        return Err(ProvisionError::PrivilegeViolation {
            user: user.name.clone(),
        });
    }
    Ok(())
}

/// Verify that per-command escalation is possible before touching the host
pub fn ensure_sudo_available() -> Result<()> {
    which::which("sudo").context(
        "Provisioning requires sudo for system paths. Run 'which sudo' to check if sudo is installed.",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_rejected() {
        let err = check_invoking_user(&InvokingUser::new("root", "root", 0)).unwrap_err();
        assert!(matches!(err, ProvisionError::PrivilegeViolation { ref user } if user == "root"));
    }

    #[test]
    fn uid_zero_alias_is_rejected() {
        assert!(check_invoking_user(&InvokingUser::new("toor", "root", 0)).is_err());
    }

    #[test]
    fn regular_user_passes() {
        assert!(check_invoking_user(&InvokingUser::new("allsky", "allsky", 1000)).is_ok());
    }
}
