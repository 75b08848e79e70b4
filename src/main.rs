mod cli;

use anyhow::Result;
use clap::Parser;
use log::error;

use allsky_provision::install::{self, InstallOptions, ProvisionError};

fn main() {
    // Initialize logger with custom format
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(exit_code(&e));
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Install {
        config: None,
        driver: None,
        no_start: false,
    }) {
        cli::Cmd::Install {
            config,
            driver,
            no_start,
        } => {
            install::run_install(&InstallOptions {
                config,
                driver,
                no_start,
            })?;
            Ok(())
        }
        cli::Cmd::Detect { config } => install::run_detect(config),
    }
}

/// Domain failures carry their own exit code; anything else is 1
fn exit_code(e: &anyhow::Error) -> i32 {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .map(ProvisionError::exit_code)
        .unwrap_or(1)
}
