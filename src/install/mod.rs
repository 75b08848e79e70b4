//! indi-allsky provisioning library
//!
//! This library turns a supported Linux host into an indi-allsky camera
//! station: it resolves an installation profile for the detected platform,
//! installs packages, lays out storage, renders and installs the service,
//! logging and web configuration, backs up and migrates the database, and
//! brings the services up in dependency order.
//!
//! # Entry points
//! - [`provision`] drives a run against injected collaborators
//! - [`run_install`] / [`run_detect`] wire the real host adapters

pub mod database;
pub mod detection;
pub mod error;
pub mod exec;
pub mod linux;
mod orchestration;
pub mod packages;
pub mod privilege;
pub mod profile;
mod runners;
pub mod sequencer;
pub mod template;
pub mod wizard;

pub use database::{BackupArtifact, DatabaseTooling, SqliteFlaskMigrate, backup_and_migrate};
pub use detection::PlatformIdentity;
pub use error::{BackupStage, ProvisionError, ServiceAction};
pub use exec::CommandError;
pub use orchestration::{Collaborators, ProvisionReport, RunContext, STATIC_ASSETS, phase_progress, provision};
pub use packages::{HostPackages, PackageManager, PythonEnv, Virtualenv};
pub use privilege::{InvokingUser, check_invoking_user};
pub use profile::{InstallationProfile, OsFamily, RepositoryDirective};
pub use runners::{InstallOptions, run_detect, run_install};
pub use template::TemplateDocument;
pub use wizard::{DriverPrompt, FixedDriver, InquirePrompt};
