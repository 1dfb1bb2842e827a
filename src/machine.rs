//! The installation transition table.
//!
//! [`apply`] is the only code that changes [`SetupSession::stage`]. It is a
//! pure function of the session, a trigger and the platform's capability
//! flags, so every path can be tested without running anything.

use crate::platform::PlatformProfile;
use crate::session::{SetupFailure, SetupSession};
use crate::InstallationStage::{self, *};
use thiserror::Error;

/// An event that may move the session to another stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A client asked for setup to begin.
    StartRequested,
    /// The operator confirmed a setup paused at `AwaitingStart`.
    StartConfirmed,
    /// The probe found the container runtime.
    RuntimePresent,
    /// The probe did not find the container runtime.
    RuntimeMissing,
    /// The runtime installer is about to run.
    InstallBegins,
    /// The installer needs an operator credential first.
    CredentialNeeded,
    /// The operator supplied the credential.
    CredentialSupplied,
    /// The installer finished and the runtime was verified.
    InstallSucceeded,
    /// Container provisioning is about to run.
    ProvisioningBegins,
    /// The container is running and ready.
    ProvisionSucceeded,
    /// The schema was initialized.
    SchemaInitialized,
    /// The current step failed.
    Failed(SetupFailure),
    /// The operator asked to retry a failed stage.
    RetryRequested,
}

impl Trigger {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartRequested => "start requested",
            Self::StartConfirmed => "start confirmed",
            Self::RuntimePresent => "runtime present",
            Self::RuntimeMissing => "runtime missing",
            Self::InstallBegins => "install begins",
            Self::CredentialNeeded => "credential needed",
            Self::CredentialSupplied => "credential supplied",
            Self::InstallSucceeded => "install succeeded",
            Self::ProvisioningBegins => "provisioning begins",
            Self::ProvisionSucceeded => "provision succeeded",
            Self::SchemaInitialized => "schema initialized",
            Self::Failed(_) => "failed",
            Self::RetryRequested => "retry requested",
        }
    }
}

/// A trigger that is not valid in the current stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition from {from} on {trigger}")]
pub struct TransitionError {
    /// Stage the session was in.
    pub from: InstallationStage,
    /// Name of the rejected trigger.
    pub trigger: &'static str,
}

/// Stage a retry re-enters after a failure in `stage`.
///
/// Waiting for a credential is part of installing, so a failed wait
/// re-enters `RuntimeInstalling` and a fresh request is issued.
pub fn retry_target(stage: InstallationStage) -> InstallationStage {
    match stage {
        AwaitingPrivilegedCredential => RuntimeInstalling,
        other => other,
    }
}

/// Apply `trigger` to `session`, returning the stage entered.
///
/// A rejected trigger leaves the session untouched.
pub fn apply(
    session: &mut SetupSession,
    trigger: Trigger,
    profile: &PlatformProfile,
) -> Result<InstallationStage, TransitionError> {
    let from = session.stage();
    let rejected = |trigger: &Trigger| TransitionError {
        from,
        trigger: trigger.name(),
    };

    let next = match (from, &trigger) {
        (NotStarted, Trigger::StartRequested) => {
            if profile.requires_start_confirmation {
                AwaitingStart
            } else {
                ProbingRuntime
            }
        }
        (AwaitingStart, Trigger::StartConfirmed) => ProbingRuntime,
        (ProbingRuntime, Trigger::RuntimePresent) => RuntimeInstalled,
        (ProbingRuntime, Trigger::RuntimeMissing) => RuntimeAbsent,
        (RuntimeAbsent, Trigger::InstallBegins) => RuntimeInstalling,
        (RuntimeInstalling, Trigger::CredentialNeeded)
            if profile.requires_interactive_elevation =>
        {
            AwaitingPrivilegedCredential
        }
        (AwaitingPrivilegedCredential, Trigger::CredentialSupplied) => RuntimeInstalling,
        (RuntimeInstalling, Trigger::InstallSucceeded) => RuntimeInstalled,
        (RuntimeInstalled, Trigger::ProvisioningBegins) => ContainerProvisioning,
        (ContainerProvisioning, Trigger::ProvisionSucceeded) => ContainerStarted,
        (ContainerStarted, Trigger::SchemaInitialized) => SetupComplete,
        (stage, Trigger::Failed(failure)) if stage != NotStarted && !stage.is_terminal() => {
            session.record_failure(retry_target(stage), failure.clone());
            let failed = stage.failure_stage();
            session.enter(failed);
            return Ok(failed);
        }
        (RuntimeInstallFailed | ContainerSetupFailed, Trigger::RetryRequested) => {
            match session.clear_failure() {
                Some(stage) => stage,
                None => return Err(rejected(&trigger)),
            }
        }
        _ => return Err(rejected(&trigger)),
    };

    session.enter(next);
    Ok(next)
}
