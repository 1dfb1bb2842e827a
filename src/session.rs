//! The orchestrator's mutable setup state.

use crate::privilege::{ChannelError, PrivilegeRequest};
use crate::{InstallationStage, ProbeError, ProvisionError, SupervisorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which part of setup a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSource {
    /// Output of the runtime probe and installer.
    RuntimeInstall,
    /// Output of container creation, readiness and schema setup.
    ContainerProvisioning,
}

/// One appended log line. Never mutated or reordered once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Log the line belongs to.
    pub source: LogSource,
    /// Position in its log, starting at 1 with no gaps.
    pub seq: u64,
    /// Line text.
    pub text: String,
}

/// Why the session is sitting in a failed stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SetupFailure {
    /// Host facts could not be determined.
    #[error("runtime probe failed: {0}")]
    ProbeFailed(#[from] ProbeError),

    /// The runtime installer failed.
    #[error("runtime installation failed: {0}")]
    InstallFailed(#[from] SupervisorError),

    /// The credential handshake failed.
    #[error("credential request failed: {0}")]
    Credential(#[from] ChannelError),

    /// There is no installer for this platform.
    #[error("no container runtime installer for {platform}")]
    UnsupportedPlatform {
        /// Platform display name.
        platform: String,
    },

    /// The installer succeeded but the runtime is still not found.
    #[error("installer finished but the container runtime is still not available")]
    VerificationFailed,

    /// The database container could not be provisioned.
    #[error("container setup failed: {0}")]
    Provision(#[from] ProvisionError),

    /// The operator cancelled setup.
    #[error("setup was cancelled")]
    Cancelled,
}

impl SetupFailure {
    /// Get an actionable suggestion for fixing this failure.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::ProbeFailed(e) => e.fix_suggestion(),
            Self::InstallFailed(e) => e.fix_suggestion(),
            Self::Credential(e) => e.fix_suggestion(),
            Self::UnsupportedPlatform { .. } => "Install Docker manually, then retry",
            Self::VerificationFailed => {
                "Log out and back in (or restart) so the runtime is on PATH, then retry"
            }
            Self::Provision(e) => e.fix_suggestion(),
            Self::Cancelled => "Retry when ready",
        }
    }
}

/// State of one setup session.
///
/// Owned by the orchestrator and only mutated through its transition
/// function ([`crate::machine::apply`]) and log appends. Not persisted: a
/// new process always starts at [`InstallationStage::NotStarted`].
#[derive(Debug, Clone)]
pub struct SetupSession {
    stage: InstallationStage,
    entered: Vec<InstallationStage>,
    retry_at: Option<InstallationStage>,
    last_error: Option<SetupFailure>,
    pending_request: Option<PrivilegeRequest>,
    runtime_log: Vec<LogLine>,
    container_log: Vec<LogLine>,
}

impl Default for SetupSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupSession {
    /// Fresh session at `NotStarted`.
    pub fn new() -> Self {
        Self {
            stage: InstallationStage::NotStarted,
            entered: vec![InstallationStage::NotStarted],
            retry_at: None,
            last_error: None,
            pending_request: None,
            runtime_log: Vec::new(),
            container_log: Vec::new(),
        }
    }

    /// The current stage.
    pub fn stage(&self) -> InstallationStage {
        self.stage
    }

    /// Every stage entered so far, in order, starting with `NotStarted`.
    pub fn stage_history(&self) -> &[InstallationStage] {
        &self.entered
    }

    /// The stage a retry re-enters, while in a failed stage.
    pub fn retry_stage(&self) -> Option<InstallationStage> {
        self.retry_at
    }

    /// The failure that put the session in its failed stage.
    pub fn last_error(&self) -> Option<&SetupFailure> {
        self.last_error.as_ref()
    }

    /// The outstanding credential request, if any.
    pub fn pending_request(&self) -> Option<&PrivilegeRequest> {
        self.pending_request.as_ref()
    }

    /// All lines of one log.
    pub fn log(&self, source: LogSource) -> &[LogLine] {
        match source {
            LogSource::RuntimeInstall => &self.runtime_log,
            LogSource::ContainerProvisioning => &self.container_log,
        }
    }

    /// Append a line and return it with its sequence number.
    pub(crate) fn append_log(&mut self, source: LogSource, text: impl Into<String>) -> LogLine {
        let log = match source {
            LogSource::RuntimeInstall => &mut self.runtime_log,
            LogSource::ContainerProvisioning => &mut self.container_log,
        };
        let line = LogLine {
            source,
            seq: log.len() as u64 + 1,
            text: text.into(),
        };
        log.push(line.clone());
        line
    }

    pub(crate) fn set_pending_request(&mut self, request: Option<PrivilegeRequest>) {
        self.pending_request = request;
    }

    pub(crate) fn enter(&mut self, stage: InstallationStage) {
        self.stage = stage;
        self.entered.push(stage);
    }

    pub(crate) fn record_failure(&mut self, retry_at: InstallationStage, failure: SetupFailure) {
        self.retry_at = Some(retry_at);
        self.last_error = Some(failure);
    }

    pub(crate) fn clear_failure(&mut self) -> Option<InstallationStage> {
        self.last_error = None;
        self.retry_at.take()
    }
}
