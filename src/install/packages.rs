//! System package manager and python runtime adapters.

use std::path::Path;
use std::process::Command;

use super::exec::{self, CommandError};
use super::profile::{OsFamily, RepositoryAction, RepositoryDirective};

/// Package installation as seen by the orchestrator
pub trait PackageManager {
    fn add_repository(&self, family: OsFamily, directive: &RepositoryDirective) -> Result<(), CommandError>;
    fn refresh(&self, family: OsFamily) -> Result<(), CommandError>;
    fn install(&self, family: OsFamily, packages: &[String]) -> Result<(), CommandError>;
}

/// `apt-get` / `dnf` through sudo
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPackages;

impl PackageManager for HostPackages {
    fn add_repository(&self, family: OsFamily, directive: &RepositoryDirective) -> Result<(), CommandError> {
        log::info!("Registering repository {}", directive.name);
        match directive.action {
            RepositoryAction::Ppa(ppa) => {
                exec::sudo("add-apt-repository", ["-y", ppa])?;
            }
            RepositoryAction::AptSource { list_file, line, key_url } => {
                let script = format!(
                    "curl -fsSL '{key_url}' | apt-key add - && echo '{line}' > '{list_file}'"
                );
                exec::sudo("sh", ["-c", script.as_str()])?;
            }
            RepositoryAction::RpmRelease(package) => {
                self.install(family, &[package.to_string()])?;
            }
        }
        Ok(())
    }

    fn refresh(&self, family: OsFamily) -> Result<(), CommandError> {
        match family {
            OsFamily::DebianLike => exec::sudo("apt-get", ["update"])?,
            OsFamily::RedhatLike => exec::sudo("dnf", ["makecache"])?,
        };
        Ok(())
    }

    fn install(&self, family: OsFamily, packages: &[String]) -> Result<(), CommandError> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut cmd = Command::new("sudo");
        match family {
            OsFamily::DebianLike => {
                cmd.args(["DEBIAN_FRONTEND=noninteractive", "apt-get", "-y", "install"]);
            }
            OsFamily::RedhatLike => {
                cmd.args(["dnf", "-y", "install"]);
            }
        }
        exec::run(cmd.args(packages))?;
        Ok(())
    }
}

/// Python virtualenv holding the application's requirements
pub trait PythonEnv {
    fn ensure(&self, venv: &Path, requirements: &Path) -> Result<(), CommandError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Virtualenv;

impl PythonEnv for Virtualenv {
    fn ensure(&self, venv: &Path, requirements: &Path) -> Result<(), CommandError> {
        if !venv.join("bin/python3").exists() {
            log::info!("Creating virtualenv {}", venv.display());
            exec::run(Command::new("python3").args(["-m", "venv"]).arg(venv))?;
        }

        let pip = venv.join("bin/pip3");
        exec::run(Command::new(&pip).args(["install", "--upgrade", "pip", "setuptools", "wheel"]))?;
        if requirements.is_file() {
            exec::run(Command::new(&pip).arg("install").arg("-r").arg(requirements))?;
        } else {
            log::warn!("No requirements file at {}", requirements.display());
        }
        Ok(())
    }
}
