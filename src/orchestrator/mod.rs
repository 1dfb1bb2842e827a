//! The installation orchestrator.
//!
//! [`Orchestrator`] owns the [`SetupSession`] and is the only writer of its
//! stage. Inbound requests (`start_setup`, `confirm_start`, `retry`,
//! `cancel`) are validated synchronously against the session and then hand
//! the session to a single background run that sequences the probe, the
//! installer and the provisioner. Progress leaves the orchestrator only
//! through the [`EventReporter`].
//!
//! # Example
//!
//! ```rust,no_run
//! use runtime_bootstrap::{Orchestrator, Secret, SetupEvent, SetupOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Orchestrator::system(SetupOptions::default());
//!     let mut events = orchestrator.subscribe_events();
//!     orchestrator.start_setup().await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SetupEvent::Stage(s) if s.stage.is_terminal() => break,
//!             SetupEvent::Stage(s) => println!("{}% {}", s.stage.progress_percent(), s.stage),
//!             SetupEvent::Log(line) => println!("  {}", line.text),
//!             SetupEvent::CredentialRequested { request_id } => {
//!                 let password = Secret::new("read from the operator");
//!                 let _ = orchestrator.submit_credential(request_id, password);
//!             }
//!         }
//!     }
//! }
//! ```

mod driver;
mod errors;

pub use errors::OrchestratorError;

use crate::config::SetupOptions;
use crate::events::{EventReporter, EventStream};
use crate::machine::{self, Trigger};
use crate::platform::{PlatformKind, PlatformProfile};
use crate::privilege::{ChannelError, PrivilegeChannel, PrivilegeRequest, RequestId, Secret};
use crate::probe::{CapabilityProbe, SystemProbe};
use crate::provision::{ContainerProvisioner, ContainerRuntime, DockerCli};
use crate::session::{LogSource, SetupFailure, SetupSession};
use crate::{InstallationStage, ProcessSupervisor, SupervisorOptions};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info};

/// Point-in-time view of the session, readable while a run is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// The current stage.
    pub stage: InstallationStage,
    /// Why the session failed, while in a failed stage.
    pub last_error: Option<SetupFailure>,
    /// A background run is driving the session.
    pub running: bool,
}

struct ActiveRun {
    cancel: watch::Sender<bool>,
}

pub(crate) struct Inner {
    session: Arc<AsyncMutex<SetupSession>>,
    reporter: EventReporter,
    channel: PrivilegeChannel,
    profile: PlatformProfile,
    probe: Arc<dyn CapabilityProbe>,
    provisioner: ContainerProvisioner,
    supervisor: ProcessSupervisor,
    options: SetupOptions,
    status: watch::Sender<SessionStatus>,
    active: Mutex<Option<ActiveRun>>,
}

/// Handle to the installation orchestrator.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Orchestrator for a platform with the given collaborators.
    pub fn new(
        profile: PlatformProfile,
        probe: Arc<dyn CapabilityProbe>,
        runtime: Arc<dyn ContainerRuntime>,
        options: SetupOptions,
    ) -> Self {
        let supervisor = ProcessSupervisor::new(SupervisorOptions {
            timeout: options.install_timeout,
            elevator: options.elevator.clone(),
            requires_interactive_elevation: profile.requires_interactive_elevation,
        });
        let provisioner =
            ContainerProvisioner::new(runtime, options.database.clone(), options.readiness);
        let (status, _) = watch::channel(SessionStatus {
            stage: InstallationStage::NotStarted,
            last_error: None,
            running: false,
        });

        Self {
            inner: Arc::new(Inner {
                session: Arc::new(AsyncMutex::new(SetupSession::new())),
                reporter: EventReporter::new(options.event_buffer),
                channel: PrivilegeChannel::new(),
                profile,
                probe,
                provisioner,
                supervisor,
                options,
                status,
                active: Mutex::new(None),
            }),
        }
    }

    /// Orchestrator for the running host, using [`SystemProbe`] and the
    /// `docker` CLI.
    pub fn system(options: SetupOptions) -> Self {
        let runtime = Arc::new(DockerCli::new("docker", options.command_timeout));
        Self::new(
            PlatformProfile::for_kind(PlatformKind::current()),
            Arc::new(SystemProbe::default()),
            runtime,
            options,
        )
    }

    /// Capability flags the session runs with.
    pub fn profile(&self) -> PlatformProfile {
        self.inner.profile
    }

    /// Begin setup.
    ///
    /// Announces `NotStarted`, then moves to `ProbingRuntime` and starts
    /// the background run, or to `AwaitingStart` on platforms that need
    /// [`confirm_start`](Self::confirm_start) first.
    pub async fn start_setup(&self) -> Result<(), OrchestratorError> {
        let mut active = self.inner.active();
        if active.is_some() {
            return Err(OrchestratorError::SetupAlreadyInProgress);
        }
        let mut session = self.inner.try_session()?;
        match session.stage() {
            InstallationStage::NotStarted => {}
            InstallationStage::SetupComplete => {
                return Err(OrchestratorError::SetupAlreadyComplete)
            }
            stage if stage.is_failed() => return Err(OrchestratorError::RetryRequired { stage }),
            _ => return Err(OrchestratorError::SetupAlreadyInProgress),
        }

        info!(platform = ?self.inner.profile.kind, "setup requested");
        self.inner.reporter.publish_stage(InstallationStage::NotStarted);
        let stage = self.inner.transition(&mut session, Trigger::StartRequested);
        if stage != Some(InstallationStage::AwaitingStart) {
            self.launch(&mut active, session);
        }
        Ok(())
    }

    /// Resume a session paused at `AwaitingStart`.
    pub async fn confirm_start(&self) -> Result<(), OrchestratorError> {
        let mut active = self.inner.active();
        if active.is_some() {
            return Err(OrchestratorError::SetupAlreadyInProgress);
        }
        let mut session = self.inner.try_session()?;
        let stage = session.stage();
        if stage != InstallationStage::AwaitingStart {
            return Err(OrchestratorError::NotAwaitingConfirmation { stage });
        }

        self.inner.transition(&mut session, Trigger::StartConfirmed);
        self.launch(&mut active, session);
        Ok(())
    }

    /// Answer the outstanding credential request.
    ///
    /// Only the channel is touched; a rejected submission leaves the
    /// session exactly as it was.
    pub fn submit_credential(&self, id: RequestId, secret: Secret) -> Result<(), ChannelError> {
        self.inner.channel.submit_credential(id, secret)
    }

    /// Re-enter the stage that failed.
    ///
    /// `stage_hint`, when given, must name that stage (or the failed stage
    /// itself).
    pub async fn retry(
        &self,
        stage_hint: Option<InstallationStage>,
    ) -> Result<(), OrchestratorError> {
        let mut active = self.inner.active();
        if active.is_some() {
            return Err(OrchestratorError::SetupAlreadyInProgress);
        }
        let mut session = self.inner.try_session()?;
        let stage = session.stage();
        if !stage.is_failed() {
            return Err(OrchestratorError::NotFailed { stage });
        }
        let expected = session.retry_stage().unwrap_or(stage);
        if let Some(requested) = stage_hint {
            if requested != expected && requested != stage {
                return Err(OrchestratorError::InvalidRetryStage {
                    requested,
                    expected,
                });
            }
        }

        info!(from = %stage, to = %expected, "retry requested");
        let entered = self.inner.transition(&mut session, Trigger::RetryRequested);
        if entered != Some(InstallationStage::AwaitingStart) {
            self.launch(&mut active, session);
        }
        Ok(())
    }

    /// Abort the active run, or a session paused at `AwaitingStart`.
    ///
    /// Running child processes are killed and an outstanding credential
    /// request is withdrawn. The session moves to the failed stage of the
    /// current phase with [`SetupFailure::Cancelled`].
    pub async fn cancel(&self) -> Result<(), OrchestratorError> {
        let active = self.inner.active();
        if let Some(run) = active.as_ref() {
            info!("cancelling setup");
            run.cancel.send_replace(true);
            self.inner.channel.cancel_outstanding();
            return Ok(());
        }

        let mut session = self
            .inner
            .session
            .try_lock()
            .map_err(|_| OrchestratorError::NothingToCancel)?;
        if session.stage() != InstallationStage::AwaitingStart {
            return Err(OrchestratorError::NothingToCancel);
        }
        self.inner
            .transition(&mut session, Trigger::Failed(SetupFailure::Cancelled));
        Ok(())
    }

    /// Subscribe to stage, log and credential events from now on.
    pub fn subscribe_events(&self) -> EventStream {
        self.inner.reporter.subscribe()
    }

    /// The current status, without waiting for the run.
    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// The outstanding credential request, if any.
    pub fn pending_request(&self) -> Option<PrivilegeRequest> {
        self.inner.channel.outstanding()
    }

    /// Wait until no run is active and return the resulting status.
    pub async fn settled(&self) -> SessionStatus {
        let mut status = self.inner.status.subscribe();
        let settled = status.wait_for(|s| !s.running).await.map(|s| s.clone());
        match settled {
            Ok(s) => s,
            Err(_) => self.status(),
        }
    }

    /// A copy of the session, waiting for any active run to finish first.
    pub async fn snapshot(&self) -> SetupSession {
        self.inner.session.lock().await.clone()
    }

    fn launch(
        &self,
        active: &mut Option<ActiveRun>,
        session: OwnedMutexGuard<SetupSession>,
    ) {
        let (cancel, cancelled) = watch::channel(false);
        *active = Some(ActiveRun { cancel });
        self.inner.status.send_modify(|s| s.running = true);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(session, cancelled).await;
            *inner.active() = None;
            inner.status.send_modify(|s| s.running = false);
        });
    }
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_session(&self) -> Result<OwnedMutexGuard<SetupSession>, OrchestratorError> {
        self.session
            .clone()
            .try_lock_owned()
            .map_err(|_| OrchestratorError::SetupAlreadyInProgress)
    }

    /// Apply `trigger`, publish the stage entered and refresh the status.
    ///
    /// Returns `None` when the trigger is not valid in the current stage.
    fn transition(&self, session: &mut SetupSession, trigger: Trigger) -> Option<InstallationStage> {
        let from = session.stage();
        let failure = match &trigger {
            Trigger::Failed(failure) => Some(failure.clone()),
            _ => None,
        };

        let stage = match machine::apply(session, trigger, &self.profile) {
            Ok(stage) => stage,
            Err(e) => {
                error!(error = %e, "invalid stage transition");
                return None;
            }
        };
        if stage != InstallationStage::AwaitingPrivilegedCredential {
            session.set_pending_request(None);
        }

        info!(from = %from, to = %stage, "stage transition");
        self.reporter.publish_stage(stage);

        if let Some(failure) = failure {
            let source = if stage == InstallationStage::ContainerSetupFailed {
                LogSource::ContainerProvisioning
            } else {
                LogSource::RuntimeInstall
            };
            let line = session.append_log(
                source,
                format!("✖ {}. {}", failure, failure.fix_suggestion()),
            );
            self.reporter.publish_log(line);
        }

        let last_error = session.last_error().cloned();
        self.status.send_modify(|s| {
            s.stage = stage;
            s.last_error = last_error;
        });
        Some(stage)
    }
}
