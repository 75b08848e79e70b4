use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "indi-allsky host provisioning")]
pub struct Args {
    /// Sub‑commands (install, detect)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Provision this host (default if no sub‑command)
    Install {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Camera driver to use instead of the interactive menu
        #[arg(long, short = 'd')]
        driver: Option<String>,

        /// Enable services without starting them
        #[arg(long)]
        no_start: bool,
    },
    /// Print the detected platform and its installation profile
    Detect {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}
