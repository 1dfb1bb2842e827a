//! Error types for external process supervision.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running an external command.
///
/// Every variant carries the program that was run and can be turned into an
/// actionable hint with [`SupervisorError::fix_suggestion`].
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::SupervisorError;
///
/// let error = SupervisorError::NonZeroExit {
///     program: "apt-get".to_string(),
///     code: 100,
/// };
/// assert_eq!(error.to_string(), "apt-get exited with code 100");
/// assert!(!error.fix_suggestion().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The process could not be launched.
    #[error("failed to launch {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        message: String,
    },

    /// The OS refused to execute the program.
    #[error("permission denied launching {program}: {message}")]
    PermissionDenied {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        message: String,
    },

    /// The process ran to completion and reported failure.
    #[error("{program} exited with code {code}")]
    NonZeroExit {
        /// Program that failed.
        program: String,
        /// Exit code reported by the process.
        code: i32,
    },

    /// The process was terminated by a signal or crashed.
    #[error("{program} terminated abnormally ({code_or_signal})")]
    AbnormalExit {
        /// Program that was terminated.
        program: String,
        /// Signal number, or `-1` when the platform reports none.
        code_or_signal: i32,
    },

    /// The process did not finish within the allowed time and was killed.
    #[error("{program} timed out after {duration:?}")]
    Timeout {
        /// Program that was killed.
        program: String,
        /// How long it was allowed to run.
        duration: Duration,
    },

    /// The command is privileged and needs an operator credential first.
    #[error("{program} requires an elevation credential")]
    CredentialRequired {
        /// Program awaiting elevation.
        program: String,
    },

    /// No credential arrived within the allowed time.
    #[error("no elevation credential supplied within {waited:?}")]
    CredentialTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// Reading the process output failed.
    #[error("I/O error while supervising {program}: {message}")]
    Io {
        /// Program being supervised.
        program: String,
        /// Underlying I/O error.
        message: String,
    },
}

impl SupervisorError {
    /// Build the launch error for an `std::io::Error` from `spawn`.
    pub(crate) fn from_spawn(program: &str, error: &std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                program: program.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Spawn {
                program: program.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::Spawn { .. } => "Check that the program is installed and on PATH",
            Self::PermissionDenied { .. } => "Check the executable permissions of the program",
            Self::NonZeroExit { .. } => "See the installer output above for details, then retry",
            Self::AbnormalExit { .. } => "The process was killed; retry once the system is idle",
            Self::Timeout { .. } => "Check network connectivity and retry",
            Self::CredentialRequired { .. } => "Supply the administrator password when prompted",
            Self::CredentialTimeout { .. } => "Retry and enter the administrator password when prompted",
            Self::Io { .. } => "Retry the step",
        }
    }
}
