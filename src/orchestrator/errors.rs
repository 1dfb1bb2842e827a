//! Errors returned by the orchestrator's inbound operations.

use crate::InstallationStage;
use thiserror::Error;

/// A request the orchestrator cannot act on in its current state.
///
/// Rejected requests never change the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// A setup run is active or the session already left `NotStarted`.
    #[error("setup is already in progress")]
    SetupAlreadyInProgress,

    /// Setup finished successfully.
    #[error("setup is already complete")]
    SetupAlreadyComplete,

    /// The session failed and must be retried rather than restarted.
    #[error("setup failed at {stage}; retry instead of starting again")]
    RetryRequired {
        /// The failed stage.
        stage: InstallationStage,
    },

    /// Retry was requested but nothing has failed.
    #[error("nothing to retry: setup is at {stage}")]
    NotFailed {
        /// The current stage.
        stage: InstallationStage,
    },

    /// The retry hint names a different stage than the one that failed.
    #[error("cannot retry {requested}; the failed stage is {expected}")]
    InvalidRetryStage {
        /// Stage named by the caller.
        requested: InstallationStage,
        /// Stage a retry would re-enter.
        expected: InstallationStage,
    },

    /// `confirm_start` outside `AwaitingStart`.
    #[error("setup is not awaiting confirmation (at {stage})")]
    NotAwaitingConfirmation {
        /// The current stage.
        stage: InstallationStage,
    },

    /// `cancel` with no active run and no paused session.
    #[error("no setup is running")]
    NothingToCancel,
}

impl OrchestratorError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::SetupAlreadyInProgress => "Wait for the current setup to finish or cancel it",
            Self::SetupAlreadyComplete => "Nothing to do; the environment is ready",
            Self::RetryRequired { .. } => "Call retry to resume from the failed stage",
            Self::NotFailed { .. } => "Retry is only available after a failure",
            Self::InvalidRetryStage { .. } => "Retry without a stage hint or name the failed stage",
            Self::NotAwaitingConfirmation { .. } => "Start setup first",
            Self::NothingToCancel => "Nothing to do",
        }
    }
}
