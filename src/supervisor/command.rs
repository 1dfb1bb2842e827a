//! Command descriptions handed to the supervisor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A structured command for programmatic execution.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::CommandSpec;
///
/// let cmd = CommandSpec::new("docker")
///     .args(["volume", "create", "notes_data"])
///     .describe("Creating data volume");
/// assert_eq!(cmd.display(), "docker volume create notes_data");
/// assert!(!cmd.privileged);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The program to execute (e.g., "bash", "powershell", "docker").
    pub program: String,

    /// Arguments to pass to the program.
    pub args: Vec<String>,

    /// Environment variables to set before execution (key, value pairs).
    pub env_vars: Vec<(String, String)>,

    /// Run through the platform's [`Elevator`].
    pub privileged: bool,

    /// Human-readable description (e.g., "Installing Docker engine").
    pub description: String,
}

impl CommandSpec {
    /// Unprivileged command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            description: program.clone(),
            program,
            args: Vec::new(),
            env_vars: Vec::new(),
            privileged: false,
        }
    }

    /// Append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Mark the command as requiring elevated privilege.
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Set the human-readable description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Raw command line for display. Environment values are not shown.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Wrapper that runs a privileged command with elevated rights.
///
/// The credential is written to the wrapper's standard input, so the
/// wrapper must read it from there (`sudo -S`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elevator {
    /// Wrapper program.
    pub program: String,

    /// Arguments placed before the wrapped command.
    pub args: Vec<String>,
}

impl Elevator {
    /// Program and arguments for running `cmd` elevated.
    pub fn wrap(&self, cmd: &CommandSpec) -> (String, Vec<String>) {
        let mut args = self.args.clone();
        args.push(cmd.program.clone());
        args.extend(cmd.args.iter().cloned());
        (self.program.clone(), args)
    }
}

impl Default for Elevator {
    fn default() -> Self {
        Self {
            program: "sudo".to_string(),
            // Read the password from stdin and print no prompt of our own.
            args: vec!["-S".to_string(), "-p".to_string(), String::new()],
        }
    }
}

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// A progress note from a setup component rather than the process.
    Status,
}

/// One line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Stream the line was read from.
    pub stream: OutputStream,
    /// Line text without its trailing newline.
    pub text: String,
}

impl OutputLine {
    /// A progress note.
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Status,
            text: text.into(),
        }
    }

    /// Text as shown to subscribers; standard error is prefixed.
    pub fn render(&self) -> String {
        match self.stream {
            OutputStream::Stderr => format!("[stderr] {}", self.text),
            OutputStream::Stdout | OutputStream::Status => self.text.clone(),
        }
    }
}

/// Terminal result of a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code (always 0 for a successful run).
    pub exit_code: i32,
    /// Wall time from spawn to exit.
    pub duration: Duration,
}

/// Fully buffered output of a short query command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CapturedOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
