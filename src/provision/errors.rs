//! Error types for container provisioning.

use crate::SupervisorError;
use thiserror::Error;

/// Errors that can occur while provisioning the database container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// The container runtime daemon is not reachable.
    #[error("container runtime is not running: {message}")]
    RuntimeUnavailable {
        /// Runtime output explaining why.
        message: String,
    },

    /// The host port the container publishes is taken.
    #[error("host port {port} is already in use")]
    PortInUse {
        /// The port that could not be bound.
        port: u16,
    },

    /// Creating the container (or its volume) failed.
    #[error("failed to create container {container}: {message}")]
    CreateFailed {
        /// Container name.
        container: String,
        /// Runtime output explaining why.
        message: String,
    },

    /// Starting an existing container failed.
    #[error("failed to start container {container}: {message}")]
    StartFailed {
        /// Container name.
        container: String,
        /// Runtime output explaining why.
        message: String,
    },

    /// The database never answered within the readiness budget.
    #[error("container {container} not ready after {attempts} attempts")]
    ReadinessTimeout {
        /// Container name.
        container: String,
        /// Number of readiness checks made.
        attempts: u32,
    },

    /// A schema statement failed.
    #[error("schema statement failed ({statement}): {message}")]
    SchemaFailed {
        /// The statement, abbreviated.
        statement: String,
        /// Database output explaining why.
        message: String,
    },

    /// A schema statement would fail when re-run.
    #[error("schema statement is not idempotent: {statement}")]
    NonIdempotentSchema {
        /// The offending statement, abbreviated.
        statement: String,
    },

    /// Running a runtime command failed.
    #[error(transparent)]
    Process(#[from] SupervisorError),
}

impl ProvisionError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::RuntimeUnavailable { .. } => "Start the Docker service (or Docker Desktop), then retry",
            Self::PortInUse { .. } => "Stop the program using the database port or configure another port",
            Self::CreateFailed { .. } => "Check the runtime output above, then retry",
            Self::StartFailed { .. } => "Check the runtime output above, then retry",
            Self::ReadinessTimeout { .. } => "The database is slow to start; retry to keep waiting",
            Self::SchemaFailed { .. } => "Check the database output above, then retry",
            Self::NonIdempotentSchema { .. } => "Use CREATE ... IF NOT EXISTS for schema statements",
            Self::Process(e) => e.fix_suggestion(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_timeout_display() {
        let err = ProvisionError::ReadinessTimeout {
            container: "notes-mysql".to_string(),
            attempts: 10,
        };
        assert_eq!(err.to_string(), "container notes-mysql not ready after 10 attempts");
    }

    #[test]
    fn test_process_error_is_transparent() {
        let inner = SupervisorError::NonZeroExit {
            program: "docker".to_string(),
            code: 125,
        };
        let err = ProvisionError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.fix_suggestion(), inner.fix_suggestion());
    }
}
