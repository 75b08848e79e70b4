//! Web server layout per OS family and site/module enablement.

use std::path::Path;

use crate::install::exec::{self, CommandError};
use crate::install::profile::OsFamily;

pub const SITE_NAME: &str = "indi-allsky";

/// Where the site config goes and what must be switched on around it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebLayout {
    pub unit: &'static str,
    pub config_dir: &'static str,
    /// Embedded site template, installed verbatim
    pub site_template: &'static str,
    pub modules: &'static [&'static str],
    /// Sites enabled after the config is installed
    pub enable_sites: &'static [&'static str],
    /// Sites disabled when present
    pub disable_sites: &'static [&'static str],
}

impl WebLayout {
    pub fn for_family(family: OsFamily) -> Self {
        match family {
            OsFamily::DebianLike => WebLayout {
                unit: "apache2",
                config_dir: "/etc/apache2/sites-available",
                site_template: "apache_indi-allsky.conf",
                modules: &["ssl", "rewrite", "headers", "proxy", "proxy_http"],
                enable_sites: &[SITE_NAME],
                disable_sites: &["000-default"],
            },
            OsFamily::RedhatLike => WebLayout {
                unit: "httpd",
                config_dir: "/etc/httpd/conf.d",
                // mod_ssl on RedHat ships its key pair under /etc/pki/tls
                site_template: "apache_indi-allsky_redhat.conf",
                modules: &[],
                enable_sites: &[],
                disable_sites: &[],
            },
        }
    }

    pub fn site_file_name(&self) -> String {
        format!("{SITE_NAME}.conf")
    }
}

/// Site and module switches of the web server
pub trait WebServerAdmin {
    fn enable_module(&self, module: &str) -> Result<(), CommandError>;
    fn enable_site(&self, site: &str) -> Result<(), CommandError>;
    fn disable_site(&self, site: &str) -> Result<(), CommandError>;
}

/// Debian apache2 helpers (`a2enmod`, `a2ensite`, `a2dissite`)
#[derive(Debug, Default, Clone, Copy)]
pub struct Apache2;

impl WebServerAdmin for Apache2 {
    fn enable_module(&self, module: &str) -> Result<(), CommandError> {
        exec::sudo("a2enmod", [module])?;
        Ok(())
    }

    fn enable_site(&self, site: &str) -> Result<(), CommandError> {
        exec::sudo("a2ensite", [site])?;
        Ok(())
    }

    fn disable_site(&self, site: &str) -> Result<(), CommandError> {
        let link = Path::new("/etc/apache2/sites-enabled").join(format!("{site}.conf"));
        if !link.exists() {
            log::debug!("Site {site} not enabled, nothing to disable");
            return Ok(());
        }
        exec::sudo("a2dissite", [site])?;
        Ok(())
    }
}
