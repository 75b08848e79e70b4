//! Linux host integration: managed files, systemd units and the web server.
//!
//! # Module Structure
//!
//! - `file_ops` - Atomic file operations
//! - `resource` - Idempotent directory/file installation
//! - `unit` - Systemd unit descriptions and unit file rendering
//! - `service_control` - Service control operations (daemon-reload, enable, start, restart)
//! - `webserver` - Web server layout and site/module enablement

use super::error::ProvisionError;

mod file_ops;
pub mod resource;
pub mod service_control;
pub mod unit;
pub mod webserver;

pub use resource::{Elevation, Owner, PrivilegedFs, ResourceInstaller, ResourceKind, ResourceSpec, SudoFs};
pub use service_control::{ServiceManager, Systemctl};
pub use unit::{Activation, RunningState, ServiceUnit, UnitRole, UnitScope};
pub use webserver::{Apache2, WebLayout, WebServerAdmin};
