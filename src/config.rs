use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "provision.toml";

/// Provisioning configuration. Every field has a default; unset optional
/// paths are derived at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// indi-allsky checkout; defaults to the current directory
    pub app_directory: Option<PathBuf>,
    /// defaults to `<app_directory>/virtualenv/indi-allsky`
    pub virtualenv: Option<PathBuf>,
    pub driver_path: PathBuf,
    pub log_file: PathBuf,
    pub database: PathBuf,
    /// defaults to `<database dir>/backup`
    pub backup_dir: Option<PathBuf>,
    pub htdocs_dir: PathBuf,
    /// Application settings read by the web UI and the capture process
    pub flask_config: PathBuf,
    /// defaults to `<config dir>/systemd/user`
    pub user_unit_dir: Option<PathBuf>,
    /// defaults to the web server's site directory for the OS family
    pub web_config_dir: Option<PathBuf>,
    pub rsyslog_config: PathBuf,
    pub logrotate_config: PathBuf,
    /// Templates here override the built-in ones
    pub template_dir: Option<PathBuf>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            app_directory: None,
            virtualenv: None,
            driver_path: PathBuf::from("/usr/bin"),
            log_file: PathBuf::from("/var/log/indi-allsky/indi-allsky.log"),
            database: PathBuf::from("/var/lib/indi-allsky/indi-allsky.sqlite"),
            backup_dir: None,
            htdocs_dir: PathBuf::from("/var/www/html/allsky"),
            flask_config: PathBuf::from("/etc/indi-allsky/flask.json"),
            user_unit_dir: None,
            web_config_dir: None,
            rsyslog_config: PathBuf::from("/etc/rsyslog.d/indi-allsky.conf"),
            logrotate_config: PathBuf::from("/etc/logrotate.d/indi-allsky"),
            template_dir: None,
        }
    }
}

/// Fully resolved locations used by a provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPaths {
    pub app_directory: PathBuf,
    pub virtualenv: PathBuf,
    pub driver_path: PathBuf,
    pub log_file: PathBuf,
    pub database: PathBuf,
    pub backup_dir: PathBuf,
    pub htdocs_dir: PathBuf,
    pub flask_config: PathBuf,
    pub user_unit_dir: PathBuf,
    pub web_config_dir: Option<PathBuf>,
    pub rsyslog_config: PathBuf,
    pub logrotate_config: PathBuf,
    pub template_dir: Option<PathBuf>,
}

impl ProvisionPaths {
    pub fn log_dir(&self) -> &Path {
        self.log_file.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn database_dir(&self) -> &Path {
        self.database.parent().unwrap_or_else(|| Path::new("/"))
    }
}

impl ProvisionConfig {
    /// Default config location: `<config dir>/indi-allsky/provision.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("indi-allsky").join(CONFIG_FILE))
    }

    /// Load `explicit` if given, else the default location if present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    log::info!("No provisioning config found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let cfg_str = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: ProvisionConfig = toml::from_str(&cfg_str)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        log::info!("Using config from: {}", path.display());
        Ok(cfg)
    }

    /// Fill derived paths. `cwd` stands in for an unset application directory.
    pub fn resolve(&self, cwd: &Path) -> Result<ProvisionPaths> {
        let app_directory = self.app_directory.clone().unwrap_or_else(|| cwd.to_path_buf());
        let virtualenv = self
            .virtualenv
            .clone()
            .unwrap_or_else(|| app_directory.join("virtualenv").join("indi-allsky"));

        let backup_dir = match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .database
                .parent()
                .map(|d| d.join("backup"))
                .ok_or_else(|| anyhow::anyhow!("Database path {} has no parent", self.database.display()))?,
        };

        let user_unit_dir = match &self.user_unit_dir {
            Some(dir) => dir.clone(),
            None => dirs::config_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
                .join("systemd")
                .join("user"),
        };

        Ok(ProvisionPaths {
            app_directory,
            virtualenv,
            driver_path: self.driver_path.clone(),
            log_file: self.log_file.clone(),
            database: self.database.clone(),
            backup_dir,
            htdocs_dir: self.htdocs_dir.clone(),
            flask_config: self.flask_config.clone(),
            user_unit_dir,
            web_config_dir: self.web_config_dir.clone(),
            rsyslog_config: self.rsyslog_config.clone(),
            logrotate_config: self.logrotate_config.clone(),
            template_dir: self.template_dir.clone(),
        })
    }
}
