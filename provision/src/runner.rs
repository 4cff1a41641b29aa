// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Execution of external commands.

use std::process::{Command, Output};

use ordermap::OrderMap;
use tracing::{debug, error, info};

/// Failure of an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("refusing to run an empty command")]
    Empty,
    #[error("unable to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("'{command}' exited with status {status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("'{command}' produced output which is not UTF-8")]
    NotUtf8 { command: String },
}

/// Runs commands given as argument vectors; the first element is the program.
pub trait CommandRunner {
    /// Run a command, failing if it does not exit successfully.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the command can not be started or exits with a non-zero status.
    fn check_call(&mut self, argv: &[&str]) -> Result<(), CommandError>;

    /// Run a command and return its standard output.
    ///
    /// # Errors
    ///
    /// As [`CommandRunner::check_call`], or if the output is not UTF-8.
    fn check_output(&mut self, argv: &[&str]) -> Result<String, CommandError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &mut T {
    fn check_call(&mut self, argv: &[&str]) -> Result<(), CommandError> {
        (**self).check_call(argv)
    }

    fn check_output(&mut self, argv: &[&str]) -> Result<String, CommandError> {
        (**self).check_output(argv)
    }
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn run(argv: &[&str]) -> Result<Output, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
        let command = argv.join(" ");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("{command} failed ({}): {stderr}", output.status);
        Err(CommandError::Failed {
            command,
            status: output.status.code(),
            stderr,
        })
    }
}

impl CommandRunner for SystemRunner {
    fn check_call(&mut self, argv: &[&str]) -> Result<(), CommandError> {
        info!("running {}", argv.join(" "));
        Self::run(argv).map(|_| ())
    }

    fn check_output(&mut self, argv: &[&str]) -> Result<String, CommandError> {
        debug!("querying {}", argv.join(" "));
        let output = Self::run(argv)?;
        String::from_utf8(output.stdout).map_err(|_| CommandError::NotUtf8 {
            command: argv.join(" "),
        })
    }
}

/// Records commands instead of running them.
///
/// Every call succeeds unless registered with [`RecordingRunner::with_failure`].  Queries return
/// the output registered with [`RecordingRunner::with_output`] and fail otherwise, which reads as
/// "value not set" to the callers in this crate.
#[derive(Debug, Default, Clone)]
pub struct RecordingRunner {
    commands: Vec<Vec<String>>,
    outputs: OrderMap<String, String>,
    failures: Vec<String>,
}

impl RecordingRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `argv` with `output`.
    #[must_use]
    pub fn with_output(mut self, argv: &[&str], output: &str) -> Self {
        self.outputs.insert(argv.join(" "), output.to_string());
        self
    }

    /// Make `argv` fail with exit status 1.
    #[must_use]
    pub fn with_failure(mut self, argv: &[&str]) -> Self {
        self.failures.push(argv.join(" "));
        self
    }

    /// Every command seen so far, in call order.
    #[must_use]
    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    /// Commands seen so far, each joined by single spaces.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(|argv| argv.join(" ")).collect()
    }

    /// Forget the recorded commands, returning them.
    pub fn take(&mut self) -> Vec<Vec<String>> {
        std::mem::take(&mut self.commands)
    }

    fn record(&mut self, argv: &[&str]) -> Result<String, CommandError> {
        if argv.is_empty() {
            return Err(CommandError::Empty);
        }
        let command = argv.join(" ");
        self.commands
            .push(argv.iter().map(ToString::to_string).collect());
        if self.failures.contains(&command) {
            return Err(CommandError::Failed {
                command,
                status: Some(1),
                stderr: String::new(),
            });
        }
        Ok(command)
    }
}

impl CommandRunner for RecordingRunner {
    fn check_call(&mut self, argv: &[&str]) -> Result<(), CommandError> {
        self.record(argv).map(|_| ())
    }

    fn check_output(&mut self, argv: &[&str]) -> Result<String, CommandError> {
        let command = self.record(argv)?;
        self.outputs
            .get(&command)
            .cloned()
            .ok_or(CommandError::Failed {
                command,
                status: Some(1),
                stderr: "no recorded output".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recording_runner_answers_and_fails() {
        let mut runner = RecordingRunner::new()
            .with_output(&["ovs-vsctl", "get", "Open_vSwitch", ".", "x"], "\"1\"\n")
            .with_failure(&["false"]);
        runner.check_call(&["true"]).unwrap();
        assert!(matches!(
            runner.check_call(&["false"]),
            Err(CommandError::Failed { status: Some(1), .. })
        ));
        assert_eq!(
            runner
                .check_output(&["ovs-vsctl", "get", "Open_vSwitch", ".", "x"])
                .unwrap(),
            "\"1\"\n"
        );
        assert!(runner.check_output(&["ovs-vsctl", "get", "Open_vSwitch", ".", "y"]).is_err());
        assert!(matches!(runner.check_call(&[]), Err(CommandError::Empty)));
        assert_eq!(runner.command_lines().len(), 4);
        assert_eq!(runner.take()[0], vec!["true".to_string()]);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn system_runner_reports_status() {
        let mut runner = SystemRunner;
        assert_eq!(runner.check_output(&["echo", "hello"]).unwrap(), "hello\n");
        assert!(matches!(
            runner.check_call(&["sh", "-c", "echo oops >&2; exit 3"]),
            Err(CommandError::Failed { status: Some(3), ref stderr, .. }) if stderr == "oops"
        ));
        assert!(matches!(
            runner.check_call(&["/nonexistent/neutron-ovs-test"]),
            Err(CommandError::Spawn { .. })
        ));
    }
}
