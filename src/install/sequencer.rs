//! Service activation ordering.
//!
//! Units are handled strictly in the given order in two passes: every unit is
//! enabled first, then each one is started or restarted. The capture backend
//! must be enabled before the application, whose startup connects to it.
//! Any failure stops the run; nothing already enabled is rolled back.

use super::error::{ProvisionError, ServiceAction};
use super::linux::{Activation, RunningState, ServiceManager, ServiceUnit, UnitRole, UnitScope};

/// Enable and then start/restart `units`
pub fn activate(manager: &dyn ServiceManager, units: &mut [ServiceUnit]) -> Result<(), ProvisionError> {
    enable_all(manager, units)?;
    start_all(manager, units)
}

/// First pass: daemon-reload each scope involved, then enable in order
pub fn enable_all(manager: &dyn ServiceManager, units: &mut [ServiceUnit]) -> Result<(), ProvisionError> {
    check_order(units)?;

    for scope in [UnitScope::User, UnitScope::System] {
        if let Some(unit) = units.iter().find(|u| u.scope == scope) {
            manager
                .daemon_reload(scope)
                .map_err(|e| failure(unit, ServiceAction::DaemonReload, e))?;
        }
    }

    for unit in units.iter_mut() {
        log::info!("Enabling {}", unit.unit_file_name());
        manager
            .enable(unit)
            .map_err(|e| failure(unit, ServiceAction::Enable, e))?;
        unit.enabled = true;
    }
    Ok(())
}

/// Second pass: start or restart each unit in order
pub fn start_all(manager: &dyn ServiceManager, units: &mut [ServiceUnit]) -> Result<(), ProvisionError> {
    if let Some(unit) = units.iter().find(|u| !u.enabled) {
        return Err(ProvisionError::ServiceActivationFailure {
            unit: unit.name.clone(),
            action: ServiceAction::Start,
            reason: "unit was not enabled".to_string(),
        });
    }

    for unit in units.iter_mut() {
        let (action, result) = match unit.activation {
            Activation::Start => {
                log::info!("Starting {}", unit.unit_file_name());
                (ServiceAction::Start, manager.start(unit))
            }
            Activation::Restart => {
                log::info!("Restarting {}", unit.unit_file_name());
                (ServiceAction::Restart, manager.restart(unit))
            }
        };
        result.map_err(|e| failure(unit, action, e))?;
        unit.running = RunningState::Running;
    }
    Ok(())
}

fn check_order(units: &[ServiceUnit]) -> Result<(), ProvisionError> {
    let position = |role: UnitRole| units.iter().position(|u| u.role == role);

    if let Some(app) = position(UnitRole::Application) {
        match position(UnitRole::CaptureBackend) {
            Some(backend) if backend < app => {}
            _ => {
                return Err(ProvisionError::ServiceActivationFailure {
                    unit: units[app].name.clone(),
                    action: ServiceAction::Enable,
                    reason: "application unit must be ordered after the capture backend".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn failure(unit: &ServiceUnit, action: ServiceAction, reason: impl std::fmt::Display) -> ProvisionError {
    ProvisionError::ServiceActivationFailure {
        unit: unit.name.clone(),
        action,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::install::exec::CommandError;

    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<String>>,
        fail: Option<(&'static str, &'static str)>,
    }

    impl Recorder {
        fn failing(action: &'static str, unit: &'static str) -> Self {
            Self {
                fail: Some((action, unit)),
                ..Default::default()
            }
        }

        fn record(&self, action: &str, unit: &str) -> Result<(), CommandError> {
            self.log.borrow_mut().push(format!("{action} {unit}"));
            match self.fail {
                Some((a, u)) if a == action && u == unit => {
                    Err(CommandError::failed("systemctl", Some(1), "Job failed"))
                }
                _ => Ok(()),
            }
        }
    }

    impl ServiceManager for Recorder {
        fn daemon_reload(&self, scope: UnitScope) -> Result<(), CommandError> {
            self.record("daemon-reload", &format!("{scope:?}"))
        }
        fn enable(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
            self.record("enable", &unit.name)
        }
        fn start(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
            self.record("start", &unit.name)
        }
        fn restart(&self, unit: &ServiceUnit) -> Result<(), CommandError> {
            self.record("restart", &unit.name)
        }
    }

    fn standard_units() -> Vec<ServiceUnit> {
        vec![
            ServiceUnit::capture_backend(),
            ServiceUnit::application(),
            ServiceUnit::web_server("apache2"),
        ]
    }

    #[test]
    fn enables_everything_before_starting() {
        let manager = Recorder::default();
        let mut units = standard_units();

        activate(&manager, &mut units).unwrap();

        assert_eq!(
            *manager.log.borrow(),
            [
                "daemon-reload User",
                "daemon-reload System",
                "enable indiserver",
                "enable indi-allsky",
                "enable apache2",
                "start indiserver",
                "start indi-allsky",
                "restart apache2",
            ]
        );
        assert!(units.iter().all(|u| u.enabled && u.running == RunningState::Running));
    }

    #[test]
    fn application_start_failure_leaves_backend_enabled() {
        let manager = Recorder::failing("start", "indi-allsky");
        let mut units = standard_units();

        let err = activate(&manager, &mut units).unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::ServiceActivationFailure { ref unit, action: ServiceAction::Start, .. } if unit == "indi-allsky"
        ));
        assert!(units[0].enabled);
        assert_eq!(units[0].running, RunningState::Running);
        assert_eq!(units[1].running, RunningState::Stopped);
        assert!(!manager.log.borrow().contains(&"restart apache2".to_string()));
    }

    #[test]
    fn enable_failure_stops_before_any_start() {
        let manager = Recorder::failing("enable", "indi-allsky");
        let mut units = standard_units();

        assert!(activate(&manager, &mut units).is_err());
        assert!(manager.log.borrow().iter().all(|l| !l.starts_with("start")));
        assert!(units[0].enabled && !units[1].enabled && !units[2].enabled);
    }

    #[test]
    fn application_before_backend_is_rejected() {
        let manager = Recorder::default();
        let mut units = vec![ServiceUnit::application(), ServiceUnit::capture_backend()];

        assert!(activate(&manager, &mut units).is_err());
        assert!(manager.log.borrow().is_empty());
    }

    #[test]
    fn start_requires_prior_enable() {
        let manager = Recorder::default();
        let mut units = standard_units();
        assert!(start_all(&manager, &mut units).is_err());
        assert!(manager.log.borrow().is_empty());
    }
}
