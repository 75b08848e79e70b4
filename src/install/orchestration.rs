//! Provisioning run
//!
//! One sequential pass: privilege and platform checks, packages, camera
//! driver, storage, managed configuration, web server, python runtime,
//! database backup and migration, then service activation. Every phase runs
//! to completion or aborts the run. Nothing is mutated before a profile has
//! been resolved for the platform.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};

use super::database::{self, BackupArtifact, DatabaseTooling};
use super::detection::PlatformIdentity;
use super::error::{ProvisionError, ServiceAction};
use super::linux::unit::{render_application_unit, render_backend_unit};
use super::linux::{
    Activation, Owner, ResourceInstaller, ResourceSpec, ServiceManager, ServiceUnit, UnitRole, UnitScope,
    WebLayout, WebServerAdmin,
};
use super::packages::{PackageManager, PythonEnv};
use super::privilege::{self, InvokingUser};
use super::profile::{self, InstallationProfile};
use super::sequencer;
use super::template::{self, TemplateDocument};
use super::wizard::{self, DriverPrompt};
use crate::config::ProvisionPaths;

/// Static web assets copied from `<app>/html` into the document root
pub const STATIC_ASSETS: &[&str] = &[
    "index.html",
    "loop.html",
    "js/settings_latest.js",
    "js/settings_loop.js",
];

const PHASES: u64 = 9;

/// External systems the run drives
pub struct Collaborators<'a> {
    pub packages: &'a dyn PackageManager,
    pub python: &'a dyn PythonEnv,
    pub services: &'a dyn ServiceManager,
    pub web: &'a dyn WebServerAdmin,
    pub database: &'a dyn DatabaseTooling,
    pub drivers: &'a dyn DriverPrompt,
    /// Installer for system-owned paths
    pub system_fs: &'a ResourceInstaller,
    /// Installer for paths inside the invoking user's home
    pub user_fs: &'a ResourceInstaller,
}

/// Inputs captured once before the run starts
#[derive(Debug, Clone)]
pub struct RunContext {
    pub platform: PlatformIdentity,
    pub user: InvokingUser,
    pub paths: ProvisionPaths,
    /// Run start; names the database backup
    pub started_at: NaiveDateTime,
    /// `false` stops after enabling the units
    pub start_services: bool,
}

/// What a successful run did
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub profile: InstallationProfile,
    pub driver: String,
    pub backup: Option<BackupArtifact>,
    pub units: Vec<ServiceUnit>,
}

/// Progress bar over the provisioning phases
pub fn phase_progress() -> ProgressBar {
    let pb = ProgressBar::new(PHASES);
    if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len}  {msg}") {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb
}

/// Provision the host described by `ctx`
pub fn provision(
    ctx: &RunContext,
    host: &Collaborators<'_>,
    progress: &ProgressBar,
) -> Result<ProvisionReport, ProvisionError> {
    privilege::check_invoking_user(&ctx.user)?;

    log::info!("Resolving installation profile for {}", ctx.platform);
    let profile = profile::resolve(&ctx.platform)?;

    let run = Run {
        ctx,
        host,
        layout: WebLayout::for_family(profile.os_family),
        profile: &profile,
        progress,
    };

    run.phase("Installing packages");
    run.install_packages()?;

    run.phase("Selecting camera driver");
    let driver = wizard::select_driver(host.drivers, &ctx.paths.driver_path)?;

    run.phase("Preparing storage");
    run.prepare_storage()?;

    run.phase("Configuring logging");
    run.configure_logging()?;

    run.phase("Installing service units");
    run.install_units(&driver)?;
    run.install_app_config()?;

    run.phase("Configuring web server");
    run.configure_web()?;

    run.phase("Preparing python environment");
    host.python
        .ensure(&ctx.paths.virtualenv, &ctx.paths.app_directory.join("requirements.txt"))
        .map_err(ProvisionError::PackageInstallFailure)?;

    run.phase("Migrating database");
    let backup = database::backup_and_migrate(
        host.database,
        &ctx.paths.database,
        &ctx.paths.backup_dir,
        ctx.started_at,
    )?;

    run.phase("Activating services");
    let units = run.activate()?;

    progress.finish_with_message("Provisioning complete");
    log::info!("Provisioning of {} complete", ctx.platform);

    Ok(ProvisionReport {
        profile,
        driver,
        backup,
        units,
    })
}

struct Run<'r, 'a> {
    ctx: &'r RunContext,
    host: &'r Collaborators<'a>,
    profile: &'r InstallationProfile,
    layout: WebLayout,
    progress: &'r ProgressBar,
}

impl Run<'_, '_> {
    fn phase(&self, message: &'static str) {
        log::info!("{message}");
        self.progress.inc(1);
        self.progress.set_message(message);
    }

    fn invoking_owner(&self) -> Owner {
        Owner::new(&self.ctx.user.name, &self.ctx.user.group)
    }

    fn install_packages(&self) -> Result<(), ProvisionError> {
        let family = self.profile.os_family;
        let packages = self.host.packages;

        for directive in &self.profile.repositories {
            if !directive.applies(&self.ctx.platform, Path::exists) {
                log::info!("Repository {} not needed, skipping", directive.name);
                continue;
            }
            packages
                .add_repository(family, directive)
                .map_err(ProvisionError::PackageInstallFailure)?;
        }
        // package lists on a freshly flashed image are empty or stale
        packages.refresh(family).map_err(ProvisionError::PackageInstallFailure)?;

        let list: Vec<String> = self.profile.packages.iter().cloned().collect();
        log::info!("Installing {} packages", list.len());
        packages
            .install(family, &list)
            .map_err(ProvisionError::PackageInstallFailure)
    }

    fn prepare_storage(&self) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;
        let fs = self.host.system_fs;
        let log_owner = Owner::new(self.profile.log_owner.user, self.profile.log_owner.group);

        fs.ensure(&ResourceSpec::directory(paths.log_dir(), 0o755))?;
        fs.ensure(&ResourceSpec::file(&paths.log_file, 0o644).owned_by(log_owner))?;
        fs.ensure(&ResourceSpec::directory(paths.database_dir(), 0o755).owned_by(self.invoking_owner()))?;
        fs.ensure(&ResourceSpec::directory(&paths.backup_dir, 0o755).owned_by(self.invoking_owner()))?;
        fs.ensure(&ResourceSpec::directory(&paths.htdocs_dir, 0o755))?;
        Ok(())
    }

    /// rsyslog goes live right away so the services log from their first start
    fn configure_logging(&self) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;
        let log_file = paths.log_file.to_string_lossy();

        let rsyslog = TemplateDocument::load("rsyslog_indi-allsky.conf", paths.template_dir.as_deref())?
            .with("%LOG_FILE%", log_file.clone());
        self.install_system_copy(&paths.rsyslog_config, 0o644, checked(&rsyslog).as_bytes())?;

        let logrotate = TemplateDocument::load("logrotate_indi-allsky", paths.template_dir.as_deref())?
            .with("%LOG_FILE%", log_file);
        self.install_system_copy(&paths.logrotate_config, 0o644, checked(&logrotate).as_bytes())?;

        let rsyslog_unit = ServiceUnit::new("rsyslog", UnitScope::System, UnitRole::Other, Activation::Restart);
        self.host
            .services
            .restart(&rsyslog_unit)
            .map_err(|e| ProvisionError::ServiceActivationFailure {
                unit: rsyslog_unit.name.clone(),
                action: ServiceAction::Restart,
                reason: e.to_string(),
            })
    }

    fn install_units(&self, driver: &str) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;
        let user = &self.ctx.user.name;
        let fs = self.host.user_fs;

        fs.ensure(&ResourceSpec::directory(&paths.user_unit_dir, 0o755))?;

        let backend = render_backend_unit(paths.template_dir.as_deref(), &paths.driver_path, user, driver)?;
        let application = render_application_unit(paths.template_dir.as_deref(), user, &paths.app_directory)?;

        for (unit, content) in [
            (ServiceUnit::capture_backend(), backend),
            (ServiceUnit::application(), application),
        ] {
            warn_unresolved(&unit.unit_file_name(), &content);
            let spec = ResourceSpec::file(paths.user_unit_dir.join(unit.unit_file_name()), 0o644);
            fs.install_copy(&spec, content.as_bytes())?;
        }
        Ok(())
    }

    fn install_app_config(&self) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;
        let db_uri = format!("sqlite:///{}", paths.database.display());
        let secret = existing_secret(&paths.flask_config)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let doc = TemplateDocument::load("flask.json", paths.template_dir.as_deref())?
            .with("%DB_URI%", json_escaped(&db_uri))
            .with("%SECRET_KEY%", secret)
            .with("%HTDOCS_DIR%", json_escaped(&paths.htdocs_dir.to_string_lossy()))
            .with("%APP_DIRECTORY%", json_escaped(&paths.app_directory.to_string_lossy()));
        let rendered = checked(&doc);

        serde_json::from_str::<serde_json::Value>(&rendered).map_err(|e| {
            ProvisionError::resource(&paths.flask_config, format!("rendered configuration is not valid JSON: {e}"))
        })?;

        if let Some(dir) = paths.flask_config.parent() {
            self.host
                .system_fs
                .ensure(&ResourceSpec::directory(dir, 0o755).owned_by(self.invoking_owner()))?;
        }
        let spec = ResourceSpec::file(&paths.flask_config, 0o640).owned_by(self.invoking_owner());
        self.host.system_fs.install_copy(&spec, rendered.as_bytes())
    }

    fn configure_web(&self) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;

        let site = TemplateDocument::load(self.layout.site_template, paths.template_dir.as_deref())?;
        let config_dir = paths
            .web_config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.layout.config_dir));
        self.install_system_copy(
            &config_dir.join(self.layout.site_file_name()),
            0o644,
            site.source().as_bytes(),
        )?;

        self.copy_static_assets()?;

        let web = self.host.web;
        let failed = ProvisionError::WebServerConfigFailure;
        for module in self.layout.modules {
            web.enable_module(module).map_err(failed)?;
        }
        for site in self.layout.disable_sites {
            web.disable_site(site).map_err(failed)?;
        }
        for site in self.layout.enable_sites {
            web.enable_site(site).map_err(failed)?;
        }
        Ok(())
    }

    fn copy_static_assets(&self) -> Result<(), ProvisionError> {
        let paths = &self.ctx.paths;
        let source_root = paths.app_directory.join("html");

        for asset in STATIC_ASSETS {
            let source = source_root.join(asset);
            let content = std::fs::read(&source)
                .map_err(|e| ProvisionError::resource(&source, format!("Failed to read asset: {e}")))?;
            self.install_system_copy(&paths.htdocs_dir.join(asset), 0o644, &content)?;
        }
        Ok(())
    }

    /// Managed copy under a system path; a missing parent is created first
    fn install_system_copy(&self, dest: &Path, mode: u32, content: &[u8]) -> Result<(), ProvisionError> {
        let fs = self.host.system_fs;
        if let Some(parent) = dest.parent().filter(|p| !p.exists()) {
            fs.ensure(&ResourceSpec::directory(parent, 0o755))?;
        }
        fs.install_copy(&ResourceSpec::file(dest, mode), content)
    }

    fn activate(&self) -> Result<Vec<ServiceUnit>, ProvisionError> {
        let mut units = vec![
            ServiceUnit::capture_backend(),
            ServiceUnit::application(),
            ServiceUnit::web_server(self.layout.unit),
        ];

        if self.ctx.start_services {
            sequencer::activate(self.host.services, &mut units)?;
        } else {
            log::info!("Leaving services stopped (--no-start)");
            sequencer::enable_all(self.host.services, &mut units)?;
        }
        Ok(units)
    }
}

fn checked(doc: &TemplateDocument) -> String {
    let rendered = doc.render();
    warn_unresolved(&doc.source_path.to_string_lossy(), &rendered);
    rendered
}

fn warn_unresolved(name: &str, rendered: &str) {
    let leftover = template::unresolved_tokens(rendered);
    if !leftover.is_empty() {
        log::warn!("{name} still contains placeholders: {}", leftover.join(", "));
    }
}

/// `SECRET_KEY` of an already installed flask.json, so web sessions survive a rerun
fn existing_secret(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let config: serde_json::Value = match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring unreadable {}: {e}", path.display());
            return None;
        }
    };
    let secret = config.get("SECRET_KEY")?.as_str()?;
    if secret.is_empty() || secret.contains('%') {
        return None;
    }
    log::debug!("Keeping existing SECRET_KEY from {}", path.display());
    Some(secret.to_string())
}

/// Escape `value` for use inside a JSON string literal
fn json_escaped(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_escape_handles_quotes_and_backslashes() {
        assert_eq!(json_escaped(r#"/srv/a"b\c"#), r#"/srv/a\"b\\c"#);
        assert_eq!(json_escaped("/var/www/html/allsky"), "/var/www/html/allsky");
    }

    #[test]
    fn secret_is_reused_only_when_usable() {
        let dir = tempfile::tempdir().unwrap();
        let flask = dir.path().join("flask.json");
        assert_eq!(existing_secret(&flask), None);

        std::fs::write(&flask, r#"{"SECRET_KEY": "3f2a9c"}"#).unwrap();
        assert_eq!(existing_secret(&flask).as_deref(), Some("3f2a9c"));

        std::fs::write(&flask, r#"{"SECRET_KEY": "%SECRET_KEY%"}"#).unwrap();
        assert_eq!(existing_secret(&flask), None);

        std::fs::write(&flask, r#"{"SECRET_KEY": ""}"#).unwrap();
        assert_eq!(existing_secret(&flask), None);

        std::fs::write(&flask, "not json").unwrap();
        assert_eq!(existing_secret(&flask), None);
    }

    #[test]
    fn progress_bar_counts_every_phase() {
        assert_eq!(phase_progress().length(), Some(PHASES));
    }
}
