//! Thin wrapper around `std::process::Command` for external tools.
//!
//! Every collaborator adapter (package manager, systemctl, sqlite3, flask,
//! a2ensite) reports failures through [`CommandError`].

use std::process::{Command, Output};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", status.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    pub fn failed(program: &str, status: Option<i32>, stderr: &str) -> Self {
        CommandError::Failed {
            program: program.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Run a command to completion, returning its output when it exits successfully.
pub(crate) fn run(cmd: &mut Command) -> Result<Output, CommandError> {
    let program = describe(cmd);
    log::debug!("exec: {program}");

    let output = cmd.output().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(CommandError::failed(
            &program,
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
        ));
    }

    Ok(output)
}

/// Run `sudo <program> <args..>`
pub(crate) fn sudo<I, S>(program: &str, args: I) -> Result<Output, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    run(Command::new("sudo").arg(program).args(args))
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_message_includes_status_and_stderr() {
        let err = CommandError::failed("systemctl --user start indiserver.service", Some(5), "Unit not found.\n");
        assert_eq!(
            err.to_string(),
            "systemctl --user start indiserver.service exited with status 5: Unit not found."
        );
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run(&mut Command::new("/nonexistent/allsky-provision-tool")).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_failed_error() {
        let err = run(Command::new("sh").args(["-c", "echo broken >&2; exit 3"])).unwrap_err();
        match err {
            CommandError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
