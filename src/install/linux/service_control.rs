//! Systemd service control operations.
//!
//! User-scope units go through `systemctl --user`; system units are
//! escalated with `sudo systemctl`.

use std::process::Command;

use super::unit::{ServiceUnit, UnitScope};
use crate::install::exec::{self, CommandError};

/// Narrow view of the init system used by the provisioning run
pub trait ServiceManager {
    fn daemon_reload(&self, scope: UnitScope) -> Result<(), CommandError>;
    fn enable(&self, unit: &ServiceUnit) -> Result<(), CommandError>;
    fn start(&self, unit: &ServiceUnit) -> Result<(), CommandError>;
    fn restart(&self, unit: &ServiceUnit) -> Result<(), CommandError>;
}

/// `systemctl` adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemctl;

impl Systemctl {
    fn command(scope: UnitScope) -> Command {
        match scope {
            UnitScope::User => {
                let mut cmd = Command::new("systemctl");
                cmd.arg("--user");
                cmd
            }
            UnitScope::System => {
                let mut cmd = Command::new("sudo");
                cmd.arg("systemctl");
                cmd
            }
        }
    }

    fn unit_action(action: &str, unit: &ServiceUnit) -> Result<(), CommandError> {
        exec::run(Self::command(unit.scope).arg(action).arg(unit.unit_file_name()))?;
        Ok(())
    }
}

impl ServiceManager for Systemctl {
    fn daemon_reload(&self, scope: UnitScope) -> Result<(), CommandError> {
        exec::run(Self::command(scope).arg("daemon-reload"))?;
        Ok(())
    }

    fn enable(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
        Self::unit_action("enable", unit)
    }

    fn start(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
        Self::unit_action("start", unit)
    }

    fn restart(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
        Self::unit_action("restart", unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_units_use_user_instance() {
        let cmd = Systemctl::command(UnitScope::User);
        assert_eq!(cmd.get_program(), "systemctl");
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), ["--user"]);
    }

    #[test]
    fn system_units_are_escalated() {
        let cmd = Systemctl::command(UnitScope::System);
        assert_eq!(cmd.get_program(), "sudo");
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), ["systemctl"]);
    }
}
