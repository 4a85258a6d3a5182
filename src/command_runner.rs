use std::io::ErrorKind;
use std::process::Command;

use tracing::trace;

use crate::errors::PowerLimitError;

// Captured outcome of a single external command invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    // Exit status code, None if the process
    // was terminated by a signal
    pub status: Option<i32>,

    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    // Return the most specific failure detail the command produced,
    // preferring stderr over stdout
    pub fn detail(&self) -> String {
        let err = self.stderr.trim();

        if !err.is_empty() {
            return err.to_string();
        }

        self.stdout.trim().to_string()
    }
}

// Narrow seam around process invocation so tests can substitute
// a fake runner instead of invoking real hardware tooling
pub trait CommandRunner {
    // Run the given program to completion and capture its output
    fn run(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, PowerLimitError>;
}

// Runner backed by std::process, blocks until the child exits
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, PowerLimitError> {
        trace!("Running command: {} {}", program, args.join(" "));

        let output =
            Command::new(program).args(args).output().map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    PowerLimitError::ToolNotFound {
                        tool: program.to_string(),
                    }
                } else {
                    PowerLimitError::CommandFailed {
                        tool: program.to_string(),
                        code: None,
                        detail: err.to_string(),
                    }
                }
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn success_requires_zero_exit() {
        let output = CommandOutput {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(output.success());

        let output = CommandOutput { status: Some(4), ..output };
        assert!(!output.success());

        let output = CommandOutput { status: None, ..output };
        assert!(!output.success());
    }

    #[test]
    fn detail_prefers_stderr_over_stdout() {
        let output = CommandOutput {
            status: Some(4),
            stdout: "some stdout noise\n".to_string(),
            stderr: "Insufficient Permissions\n".to_string(),
        };

        assert_eq!(output.detail(), "Insufficient Permissions");
    }

    #[test]
    fn detail_falls_back_to_stdout() {
        let output = CommandOutput {
            status: Some(4),
            stdout: "No devices were found\n".to_string(),
            stderr: String::new(),
        };

        assert_eq!(output.detail(), "No devices were found");
    }

    #[test]
    fn missing_program_maps_to_tool_not_found() {
        let err = SystemCommandRunner
            .run("nvpl-test-no-such-program", &["--version"])
            .unwrap_err();

        assert_matches!(err, PowerLimitError::ToolNotFound { .. });
    }
}
