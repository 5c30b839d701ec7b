//! Command execution abstraction.
//!
//! Every hardware interaction goes through a [`CommandRunner`]: enumeration
//! (`lsscsi`), changer control (`mtx`) and drive control (`mt`). The runner
//! captures exit code, stdout and stderr and never fails on a nonzero exit;
//! callers decide whether a nonzero exit is fatal via [`CommandRunner::run_checked`].

use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use non-interactive `sudo`.
    Sudo,
}

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// The command line as passed to the shell.
    pub command: String,
    /// Exit code, or -1 if the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a nonzero exit into [`Error::CommandExit`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::CommandExit {
            command: self.command,
            code: self.exit_code,
            stderr: self.stderr.trim_end().to_string(),
        })
    }
}

/// Runs shell command lines.
///
/// Takes `&mut self` so scripted implementations can track the hardware
/// state their commands mutate.
pub trait CommandRunner {
    /// Runs a command line and captures its output.
    ///
    /// Only a failure to spawn the process is an error.
    fn run(&mut self, command: &str) -> Result<CommandOutput>;

    /// Runs a command line and fails if it exits nonzero.
    fn run_checked(&mut self, command: &str) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if !output.success() {
            tracing::error!(command, exit_code = output.exit_code, "command failed");
        }
        output.check()
    }
}

/// Execution context running commands through `sh -c`.
///
/// # Example
///
/// ```
/// use tapeindex_core::executor::{CommandRunner, ShellExecutor};
///
/// let mut shell = ShellExecutor::new();
/// let output = shell.run("echo ready").unwrap();
/// assert!(output.success());
/// assert_eq!(output.stdout.trim(), "ready");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    escalation: PrivilegeEscalation,
}

impl ShellExecutor {
    /// Creates a new executor with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that wraps every command with `sudo -n`.
    pub fn with_sudo() -> Self {
        Self {
            escalation: PrivilegeEscalation::Sudo,
        }
    }

    /// Creates an executor with a specific escalation method.
    pub fn with_escalation(escalation: PrivilegeEscalation) -> Self {
        Self { escalation }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    fn command(&self, line: &str) -> Command {
        match self.escalation {
            PrivilegeEscalation::None => {
                let mut cmd = Command::new("sh");
                cmd.args(["-c", line]);
                cmd
            }
            PrivilegeEscalation::Sudo => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-n", "sh", "-c", line]);
                cmd
            }
        }
    }
}

impl CommandRunner for ShellExecutor {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        debug!("shell command: {}", command);

        let output = self.command(command).output().command_context(command)?;

        let result = CommandOutput {
            command: command.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        log_command_output(&result);

        Ok(result)
    }
}

/// Logs exit code, stdout and stderr of a command at debug level.
///
/// Multi-line streams are fenced so they can be cut out of the log verbatim.
pub fn log_command_output(output: &CommandOutput) {
    debug!("returncode: {}", output.exit_code);
    debug!("stdout: {}", fence("stdout", &output.stdout));
    debug!("stderr: {}", fence("stderr", &output.stderr));
}

fn fence(label: &str, text: &str) -> String {
    let text = text.trim_end_matches('\n');
    if text.is_empty() {
        "N/A".to_string()
    } else if text.contains('\n') {
        format!("\n[begin {label}]\n{text}\n[end {label}]")
    } else {
        text.to_string()
    }
}

/// Blocking wait used after a changer load so the drive can finish threading
/// the tape. This is the only suspension point of a discovery run.
pub trait Settle {
    fn settle(&mut self, duration: Duration);
}

/// [`Settle`] implementation that sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Settle for ThreadSleep {
    fn settle(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
