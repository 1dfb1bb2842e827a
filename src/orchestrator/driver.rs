//! The background run that advances a session stage by stage.

use super::Inner;
use crate::events::SetupEvent;
use crate::machine::Trigger;
use crate::privilege::Secret;
use crate::probe::check_supported_version;
use crate::session::{LogSource, SetupFailure, SetupSession};
use crate::{install_plan, InstallationStage, OutputLine, SupervisorError};
use std::future::Future;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Resolves once `cancelled` flips to true. Never resolves if the sender
/// is gone without cancelling.
async fn cancellation(cancelled: &mut watch::Receiver<bool>) {
    if cancelled.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `step` unless cancellation wins first. Dropping the step kills its
/// child processes and withdraws its credential request.
async fn unless_cancelled<F>(cancelled: &mut watch::Receiver<bool>, step: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancellation(cancelled) => None,
        output = step => Some(output),
    }
}

impl Inner {
    /// Advance the session until it completes, fails or pauses.
    pub(super) async fn drive(
        &self,
        mut session: OwnedMutexGuard<SetupSession>,
        mut cancelled: watch::Receiver<bool>,
    ) {
        // Held from the moment it is supplied until the installer is launched.
        let mut secret: Option<Secret> = None;

        loop {
            let stage = session.stage();
            let step = match stage {
                InstallationStage::ProbingRuntime => {
                    unless_cancelled(&mut cancelled, self.probe_runtime(&mut session)).await
                }
                InstallationStage::RuntimeAbsent => Some(Trigger::InstallBegins),
                InstallationStage::RuntimeInstalling => {
                    let credential = secret.take();
                    unless_cancelled(&mut cancelled, self.install_runtime(&mut session, credential))
                        .await
                }
                InstallationStage::AwaitingPrivilegedCredential => {
                    match unless_cancelled(&mut cancelled, self.await_credential(&mut session)).await
                    {
                        Some(Ok(supplied)) => {
                            secret = Some(supplied);
                            Some(Trigger::CredentialSupplied)
                        }
                        Some(Err(failure)) => Some(Trigger::Failed(failure)),
                        None => None,
                    }
                }
                InstallationStage::RuntimeInstalled => Some(Trigger::ProvisioningBegins),
                InstallationStage::ContainerProvisioning => {
                    unless_cancelled(&mut cancelled, self.provision_container(&mut session)).await
                }
                InstallationStage::ContainerStarted => {
                    unless_cancelled(&mut cancelled, self.initialize_schema(&mut session)).await
                }
                InstallationStage::NotStarted
                | InstallationStage::AwaitingStart
                | InstallationStage::RuntimeInstallFailed
                | InstallationStage::ContainerSetupFailed
                | InstallationStage::SetupComplete => break,
            };

            let trigger = match step {
                Some(trigger) => trigger,
                None => {
                    info!(stage = %stage, "setup cancelled");
                    Trigger::Failed(SetupFailure::Cancelled)
                }
            };
            if self.transition(&mut session, trigger).is_none() {
                break;
            }
        }

        debug!(stage = %session.stage(), "setup run finished");
    }

    /// Append a line to a session log and publish it.
    fn log(&self, session: &mut SetupSession, source: LogSource, line: OutputLine) {
        let line = session.append_log(source, line.render());
        self.reporter.publish_log(line);
    }

    async fn probe_runtime(&self, session: &mut SetupSession) -> Trigger {
        let source = LogSource::RuntimeInstall;
        self.log(session, source, OutputLine::status("▶ Detecting platform..."));
        let platform = match self.probe.detect_os().await {
            Ok(platform) => platform,
            Err(e) => return Trigger::Failed(e.into()),
        };
        if platform.kind != self.profile.kind {
            warn!(detected = ?platform.kind, configured = ?self.profile.kind, "platform mismatch");
        }
        self.log(
            session,
            source,
            OutputLine::status(format!(
                "{} {} ({})",
                platform.kind.display_name(),
                platform.version.as_deref().unwrap_or("unknown release"),
                platform.arch
            )),
        );
        if let Err(e) = check_supported_version(&platform, &self.options.supported_os_versions) {
            return Trigger::Failed(e.into());
        }

        self.log(session, source, OutputLine::status("▶ Checking for Docker..."));
        match self.probe.is_runtime_installed().await {
            Ok(true) => {
                self.log(session, source, OutputLine::status("✓ Docker is installed"));
                Trigger::RuntimePresent
            }
            Ok(false) => {
                self.log(session, source, OutputLine::status("Docker is not installed"));
                match self.probe.check_prerequisites(&platform).await {
                    Ok(()) => Trigger::RuntimeMissing,
                    Err(e) => Trigger::Failed(e.into()),
                }
            }
            Err(e) => Trigger::Failed(e.into()),
        }
    }

    async fn install_runtime(&self, session: &mut SetupSession, credential: Option<Secret>) -> Trigger {
        let plan = self
            .options
            .install_command
            .clone()
            .or_else(|| install_plan(self.profile.kind));
        let Some(cmd) = plan else {
            return Trigger::Failed(SetupFailure::UnsupportedPlatform {
                platform: self.profile.kind.display_name().to_string(),
            });
        };

        let has_credential = credential.is_some();
        let result = {
            let reporter = &self.reporter;
            let mut on_line = |line: OutputLine| {
                let line = session.append_log(LogSource::RuntimeInstall, line.render());
                reporter.publish_log(line);
            };
            if has_credential || !self.supervisor.requires_credential(&cmd) {
                on_line(OutputLine::status(format!("▶ {}...", cmd.description)));
            }
            self.supervisor.run(&cmd, credential, &mut on_line).await
        };

        match result {
            Ok(report) => {
                info!(duration = ?report.duration, "runtime installer finished");
                self.verify_install(session).await
            }
            Err(SupervisorError::CredentialRequired { program }) => {
                debug!(program = %program, "installer needs an elevation credential");
                Trigger::CredentialNeeded
            }
            Err(e) => Trigger::Failed(SetupFailure::InstallFailed(e)),
        }
    }

    async fn verify_install(&self, session: &mut SetupSession) -> Trigger {
        self.log(
            session,
            LogSource::RuntimeInstall,
            OutputLine::status("▶ Verifying installation..."),
        );
        match self.probe.is_runtime_installed().await {
            Ok(true) => {
                self.log(
                    session,
                    LogSource::RuntimeInstall,
                    OutputLine::status("✓ Docker installed successfully"),
                );
                Trigger::InstallSucceeded
            }
            Ok(false) => Trigger::Failed(SetupFailure::VerificationFailed),
            Err(e) => Trigger::Failed(e.into()),
        }
    }

    async fn await_credential(&self, session: &mut SetupSession) -> Result<Secret, SetupFailure> {
        let pending = self.channel.request_credential()?;
        let request = pending.request().clone();
        let request_id = request.id;
        session.set_pending_request(Some(request));
        self.reporter
            .publish(SetupEvent::CredentialRequested { request_id });
        info!(request_id = %request_id, "waiting for elevation credential");

        let waited = self.options.credential_timeout;
        match timeout(waited, pending.wait()).await {
            Ok(Ok(secret)) => Ok(secret),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(request_id = %request_id, ?waited, "credential request timed out");
                Err(SupervisorError::CredentialTimeout { waited }.into())
            }
        }
    }

    async fn provision_container(&self, session: &mut SetupSession) -> Trigger {
        let reporter = &self.reporter;
        let mut on_line = |line: OutputLine| {
            let line = session.append_log(LogSource::ContainerProvisioning, line.render());
            reporter.publish_log(line);
        };
        match self.provisioner.provision(&mut on_line).await {
            Ok(()) => Trigger::ProvisionSucceeded,
            Err(e) => Trigger::Failed(e.into()),
        }
    }

    async fn initialize_schema(&self, session: &mut SetupSession) -> Trigger {
        let reporter = &self.reporter;
        let mut on_line = |line: OutputLine| {
            let line = session.append_log(LogSource::ContainerProvisioning, line.render());
            reporter.publish_log(line);
        };
        match self.provisioner.initialize_schema(&mut on_line).await {
            Ok(()) => Trigger::SchemaInitialized,
            Err(e) => Trigger::Failed(e.into()),
        }
    }
}
