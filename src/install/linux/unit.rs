//! Systemd unit descriptions and unit file rendering.

use std::path::Path;

use super::ProvisionError;
use crate::install::template::TemplateDocument;

pub const BACKEND_UNIT: &str = "indiserver";
pub const APPLICATION_UNIT: &str = "indi-allsky";

/// Whether a unit lives in the user's systemd instance or the system one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitScope {
    User,
    System,
}

/// Role of a unit in the activation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    CaptureBackend,
    Application,
    WebServer,
    Other,
}

/// What the second activation pass does with the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Start,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    pub name: String,
    pub scope: UnitScope,
    pub role: UnitRole,
    pub activation: Activation,
    pub enabled: bool,
    pub running: RunningState,
}

impl ServiceUnit {
    pub fn new(name: &str, scope: UnitScope, role: UnitRole, activation: Activation) -> Self {
        Self {
            name: name.to_string(),
            scope,
            role,
            activation,
            enabled: false,
            running: RunningState::Stopped,
        }
    }

    pub fn capture_backend() -> Self {
        Self::new(BACKEND_UNIT, UnitScope::User, UnitRole::CaptureBackend, Activation::Start)
    }

    pub fn application() -> Self {
        Self::new(APPLICATION_UNIT, UnitScope::User, UnitRole::Application, Activation::Start)
    }

    pub fn web_server(name: &str) -> Self {
        Self::new(name, UnitScope::System, UnitRole::WebServer, Activation::Restart)
    }

    /// `<name>.service`
    pub fn unit_file_name(&self) -> String {
        format!("{}.service", self.name)
    }
}

/// Render the capture backend unit for the chosen camera driver
pub fn render_backend_unit(
    template_dir: Option<&Path>,
    driver_path: &Path,
    service_user: &str,
    driver_name: &str,
) -> Result<String, ProvisionError> {
    Ok(TemplateDocument::load("indiserver.service", template_dir)?
        .with("%DRIVER_PATH%", driver_path.to_string_lossy())
        .with("%SERVICE_USER%", service_user)
        .with("%DRIVER_NAME%", driver_name)
        .render())
}

/// Render the application unit
pub fn render_application_unit(
    template_dir: Option<&Path>,
    app_user: &str,
    app_directory: &Path,
) -> Result<String, ProvisionError> {
    Ok(TemplateDocument::load("indi-allsky.service", template_dir)?
        .with("%APP_USER%", app_user)
        .with("%APP_DIRECTORY%", app_directory.to_string_lossy())
        .render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unit_has_driver_and_user() {
        let unit = render_backend_unit(None, Path::new("/usr/bin"), "pi", "indi_qhy_ccd").unwrap();
        assert!(unit.contains("ExecStart=/usr/bin/indiserver -v indi_qhy_ccd\n"));
        assert!(unit.contains("INDIDEV=pi"));
        assert!(!unit.contains('%'));
    }

    #[test]
    fn application_unit_has_directory() {
        let unit = render_application_unit(None, "pi", Path::new("/home/pi/indi-allsky")).unwrap();
        assert!(unit.contains("WorkingDirectory=/home/pi/indi-allsky\n"));
        assert!(unit.contains("INDI_ALLSKY_USER=pi"));
        assert!(unit.contains("After=indiserver.service"));
    }

    #[test]
    fn constructors_set_scope_and_activation() {
        assert_eq!(ServiceUnit::capture_backend().scope, UnitScope::User);
        assert_eq!(ServiceUnit::application().unit_file_name(), "indi-allsky.service");
        let web = ServiceUnit::web_server("apache2");
        assert_eq!(web.scope, UnitScope::System);
        assert_eq!(web.activation, Activation::Restart);
        assert!(!web.enabled);
    }
}
