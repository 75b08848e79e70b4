//! Camera driver selection
//!
//! Only drivers whose binary is present in the driver path are offered.

use std::path::Path;

use inquire::Select;

use super::error::ProvisionError;

/// Known INDI camera drivers and their menu labels
pub const CAMERA_DRIVERS: &[(&str, &str)] = &[
    ("indi_asi_ccd", "ZWO ASI"),
    ("indi_qhy_ccd", "QHY CCD"),
    ("indi_playerone_ccd", "Player One Astronomy"),
    ("indi_toupcam_ccd", "ToupTek"),
    ("indi_svbony_ccd", "SVBony"),
    ("indi_sx_ccd", "Starlight Xpress"),
    ("indi_gphoto_ccd", "Generic GPhoto (DSLR)"),
    ("indi_canon_ccd", "Canon DSLR"),
    ("indi_nikon_ccd", "Nikon DSLR"),
    ("indi_sony_ccd", "Sony DSLR"),
    ("indi_pentax_ccd", "Pentax DSLR"),
    ("indi_v4l2_ccd", "Video4Linux"),
    ("indi_webcam_ccd", "Web camera"),
    ("indi_simulator_ccd", "CCD Simulator"),
];

/// A driver the operator can pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverChoice {
    pub name: String,
    pub label: String,
}

impl std::fmt::Display for DriverChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.name)
    }
}

/// Interactive (or scripted) choice among installed drivers
pub trait DriverPrompt {
    fn choose(&self, candidates: &[DriverChoice]) -> Result<String, ProvisionError>;
}

/// Terminal menu
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompt;

impl DriverPrompt for InquirePrompt {
    fn choose(&self, candidates: &[DriverChoice]) -> Result<String, ProvisionError> {
        Select::new("Select the camera driver:", candidates.to_vec())
            .with_page_size(12)
            .prompt()
            .map(|choice| choice.name)
            .map_err(|e| ProvisionError::DriverSelection(e.to_string()))
    }
}

/// Driver named up front (`--driver`)
#[derive(Debug, Clone)]
pub struct FixedDriver(pub String);

impl DriverPrompt for FixedDriver {
    fn choose(&self, candidates: &[DriverChoice]) -> Result<String, ProvisionError> {
        if candidates.iter().any(|c| c.name == self.0) {
            Ok(self.0.clone())
        } else {
            Err(ProvisionError::DriverSelection(format!(
                "driver '{}' is not installed",
                self.0
            )))
        }
    }
}

/// Known drivers present in `driver_path`, in menu order
pub fn installed_drivers(driver_path: &Path) -> Vec<DriverChoice> {
    CAMERA_DRIVERS
        .iter()
        .filter(|(name, _)| driver_path.join(name).is_file())
        .map(|(name, label)| DriverChoice {
            name: name.to_string(),
            label: label.to_string(),
        })
        .collect()
}

/// Offer the installed drivers through `prompt`
pub fn select_driver(prompt: &dyn DriverPrompt, driver_path: &Path) -> Result<String, ProvisionError> {
    let candidates = installed_drivers(driver_path);
    if candidates.is_empty() {
        return Err(ProvisionError::DriverSelection(format!(
            "no INDI camera drivers found in {}",
            driver_path.display()
        )));
    }
    let driver = prompt.choose(&candidates)?;
    log::info!("Camera driver: {driver}");
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        dir
    }

    #[test]
    fn only_present_drivers_are_offered() {
        let dir = driver_dir(&["indi_simulator_ccd", "indi_asi_ccd", "indi_lx200generic"]);
        let names: Vec<_> = installed_drivers(dir.path()).into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["indi_asi_ccd", "indi_simulator_ccd"]);
    }

    #[test]
    fn fixed_driver_must_be_installed() {
        let dir = driver_dir(&["indi_asi_ccd"]);
        assert_eq!(
            select_driver(&FixedDriver("indi_asi_ccd".into()), dir.path()).unwrap(),
            "indi_asi_ccd"
        );
        assert!(matches!(
            select_driver(&FixedDriver("indi_qhy_ccd".into()), dir.path()),
            Err(ProvisionError::DriverSelection(_))
        ));
    }

    #[test]
    fn empty_driver_path_is_an_error() {
        let dir = driver_dir(&[]);
        assert!(select_driver(&FixedDriver("indi_asi_ccd".into()), dir.path()).is_err());
    }
}
