//! Top-level runners for the `install` and `detect` commands
//!
//! These wire the real host adapters (sudo, systemctl, apt/dnf, sqlite3,
//! flask) into the orchestrator and report the outcome on the terminal.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::database::SqliteFlaskMigrate;
use super::detection::PlatformIdentity;
use super::linux::{Apache2, ResourceInstaller, Systemctl};
use super::orchestration::{self, Collaborators, ProvisionReport, RunContext};
use super::packages::{HostPackages, Virtualenv};
use super::privilege::{self, InvokingUser};
use super::profile;
use super::wizard::{DriverPrompt, FixedDriver, InquirePrompt};
use crate::config::ProvisionConfig;

/// Options of the `install` command
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub config: Option<PathBuf>,
    /// Skip the driver menu
    pub driver: Option<String>,
    pub no_start: bool,
}

/// Provision this host
pub fn run_install(opts: &InstallOptions) -> Result<ProvisionReport> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let platform = PlatformIdentity::detect().clone();

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "indi-allsky provisioning");
    let _ = stdout.reset();
    let _ = writeln!(stdout, "Platform: {platform}\n");

    let user = InvokingUser::current()?;
    let cfg = ProvisionConfig::load(opts.config.as_deref())?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let paths = cfg.resolve(&cwd)?;

    // A root run is refused by the orchestrator itself, before sudo matters
    if privilege::check_invoking_user(&user).is_ok() {
        privilege::ensure_sudo_available()?;
    }

    let ctx = RunContext {
        platform,
        user,
        paths,
        started_at: chrono::Local::now().naive_local(),
        start_services: !opts.no_start,
    };

    let prompt: Box<dyn DriverPrompt> = match &opts.driver {
        Some(name) => Box::new(FixedDriver(name.clone())),
        None => Box::new(InquirePrompt),
    };
    let database = SqliteFlaskMigrate {
        app_directory: ctx.paths.app_directory.clone(),
        virtualenv: ctx.paths.virtualenv.clone(),
    };
    let system_fs = ResourceInstaller::sudo();
    let user_fs = ResourceInstaller::direct();

    let host = Collaborators {
        packages: &HostPackages,
        python: &Virtualenv,
        services: &Systemctl,
        web: &Apache2,
        database: &database,
        drivers: prompt.as_ref(),
        system_fs: &system_fs,
        user_fs: &user_fs,
    };

    let progress = if std::io::stdout().is_terminal() {
        orchestration::phase_progress()
    } else {
        ProgressBar::hidden()
    };

    let report = orchestration::provision(&ctx, &host, &progress).inspect_err(|_| progress.abandon())?;

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = writeln!(stdout, "\n✅ Provisioning completed successfully");
    let _ = stdout.reset();
    let _ = writeln!(stdout, "   Camera driver: {}", report.driver);
    match &report.backup {
        Some(backup) => {
            let _ = writeln!(stdout, "   Database backup: {}", backup.path.display());
        }
        None => {
            let _ = writeln!(stdout, "   Database backup: none (new database)");
        }
    }
    for unit in &report.units {
        let _ = writeln!(stdout, "   {}: {:?}", unit.unit_file_name(), unit.running);
    }
    if opts.no_start {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = writeln!(stdout, "   ⚠ Services enabled but not started (--no-start)");
        let _ = stdout.reset();
    }

    Ok(report)
}

/// Print the detected platform and the profile it resolves to
pub fn run_detect(config: Option<PathBuf>) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let platform = PlatformIdentity::detect();
    let _ = writeln!(stdout, "Platform: {platform}");

    let profile = match profile::resolve(platform) {
        Ok(profile) => profile,
        Err(e) => {
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
            let _ = writeln!(stdout, "Unsupported: {e}");
            let _ = stdout.reset();
            let _ = writeln!(stdout, "Supported platforms:");
            for (distribution, release) in profile::supported_platforms() {
                let _ = writeln!(stdout, "   {distribution} {release}");
            }
            return Err(e.into());
        }
    };

    let _ = writeln!(stdout, "OS family: {:?}", profile.os_family);
    let _ = writeln!(
        stdout,
        "Log owner: {}:{}",
        profile.log_owner.user, profile.log_owner.group
    );
    for directive in &profile.repositories {
        let state = if directive.applies(platform, std::path::Path::exists) {
            "pending"
        } else {
            "not needed"
        };
        let _ = writeln!(stdout, "Repository {}: {state}", directive.name);
    }
    let _ = writeln!(stdout, "Packages ({}):", profile.packages.len());
    for package in &profile.packages {
        let _ = writeln!(stdout, "   {package}");
    }

    let cfg = ProvisionConfig::load(config.as_deref())?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let paths = cfg.resolve(&cwd)?;
    let _ = writeln!(stdout, "Application directory: {}", paths.app_directory.display());
    let _ = writeln!(stdout, "Database: {}", paths.database.display());
    let _ = writeln!(stdout, "Backups: {}", paths.backup_dir.display());
    Ok(())
}
