//! Credential handshake, cancellation and at-most-one-run behavior.

#![cfg(unix)]

mod common;

use common::*;
use runtime_bootstrap::{
    ChannelError, CommandSpec, EventStream, InstallationStage, OrchestratorError, PlatformKind,
    RequestId, Secret, SetupEvent, SetupFailure, SupervisorError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use InstallationStage::*;

fn elevated_options() -> runtime_bootstrap::SetupOptions {
    let mut options = fast_options();
    options.install_command = Some(
        CommandSpec::new("sh")
            .args(["-c", "read pw; echo installed"])
            .privileged(),
    );
    options
}

fn linux_needing_install(options: runtime_bootstrap::SetupOptions) -> runtime_bootstrap::Orchestrator {
    orchestrator(
        PlatformKind::Linux,
        FakeProbe::new(PlatformKind::Linux, &[false, true]),
        Arc::new(FakeRuntime::ready()),
        options,
    )
}

async fn next_request(events: &mut EventStream) -> RequestId {
    let wait = async {
        loop {
            match events.recv().await {
                Some(SetupEvent::CredentialRequested { request_id }) => return request_id,
                Some(_) => continue,
                None => panic!("event stream ended before a credential request"),
            }
        }
    };
    timeout(Duration::from_secs(10), wait)
        .await
        .expect("no credential request within 10s")
}

async fn wait_for_stage(events: &mut EventStream, stage: InstallationStage) {
    let wait = async {
        loop {
            match events.recv().await {
                Some(SetupEvent::Stage(s)) if s.stage == stage => return,
                Some(_) => continue,
                None => panic!("event stream ended before {}", stage),
            }
        }
    };
    timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("never reached {}", stage));
}

#[tokio::test]
async fn test_stale_credential_is_rejected_without_side_effects() {
    let orch = linux_needing_install(elevated_options());
    let mut events = orch.subscribe_events();
    orch.start_setup().await.unwrap();
    let request_id = next_request(&mut events).await;

    let before = orch.status();
    let stale = RequestId::new();
    assert_eq!(
        orch.submit_credential(stale, Secret::new("wrong")),
        Err(ChannelError::UnknownOrStaleRequest { id: stale })
    );
    assert_eq!(orch.status(), before);
    assert_eq!(orch.pending_request().map(|r| r.id), Some(request_id));
    assert!(events.try_recv().is_none());

    orch.submit_credential(request_id, Secret::new("right")).unwrap();
    assert_eq!(orch.settled().await.stage, SetupComplete);
}

#[tokio::test]
async fn test_second_start_while_running_is_rejected() {
    let orch = linux_needing_install(elevated_options());
    let mut events = orch.subscribe_events();
    orch.start_setup().await.unwrap();
    let request_id = next_request(&mut events).await;

    assert_eq!(
        orch.start_setup().await,
        Err(OrchestratorError::SetupAlreadyInProgress)
    );
    assert_eq!(
        orch.retry(None).await,
        Err(OrchestratorError::SetupAlreadyInProgress)
    );
    assert_eq!(orch.status().stage, AwaitingPrivilegedCredential);

    orch.submit_credential(request_id, Secret::new("pw")).unwrap();
    orch.settled().await;
}

#[tokio::test]
async fn test_cancel_while_waiting_for_credential() {
    let orch = linux_needing_install(elevated_options());
    let mut events = orch.subscribe_events();
    orch.start_setup().await.unwrap();
    let abandoned = next_request(&mut events).await;

    orch.cancel().await.unwrap();
    let status = orch.settled().await;
    assert_eq!(status.stage, RuntimeInstallFailed);
    assert_eq!(status.last_error, Some(SetupFailure::Cancelled));
    assert!(orch.pending_request().is_none());
    assert_eq!(
        orch.submit_credential(abandoned, Secret::new("late")),
        Err(ChannelError::UnknownOrStaleRequest { id: abandoned })
    );
    assert!(orch.snapshot().await.pending_request().is_none());

    // Retrying resumes installing and asks again with a fresh id.
    orch.retry(Some(RuntimeInstalling)).await.unwrap();
    let fresh = next_request(&mut events).await;
    assert_ne!(fresh, abandoned);
    orch.submit_credential(fresh, Secret::new("pw")).unwrap();
    assert_eq!(orch.settled().await.stage, SetupComplete);
}

#[tokio::test]
async fn test_credential_timeout_fails_install() {
    let mut options = elevated_options();
    options.credential_timeout = Duration::from_millis(50);
    let orch = linux_needing_install(options);
    let mut events = orch.subscribe_events();
    orch.start_setup().await.unwrap();
    let expired = next_request(&mut events).await;

    let status = orch.settled().await;
    assert_eq!(status.stage, RuntimeInstallFailed);
    assert_eq!(
        status.last_error,
        Some(SetupFailure::InstallFailed(SupervisorError::CredentialTimeout {
            waited: Duration::from_millis(50),
        }))
    );
    assert_eq!(
        orch.submit_credential(expired, Secret::new("late")),
        Err(ChannelError::UnknownOrStaleRequest { id: expired })
    );
}

#[tokio::test]
async fn test_cancel_kills_running_installer() {
    let mut options = fast_options();
    options.install_command = Some(CommandSpec::new("sh").args(["-c", "echo started; sleep 30"]));
    let orch = orchestrator(
        PlatformKind::MacOS,
        FakeProbe::new(PlatformKind::MacOS, &[false]),
        Arc::new(FakeRuntime::ready()),
        options,
    );
    let mut events = orch.subscribe_events();
    orch.start_setup().await.unwrap();
    wait_for_stage(&mut events, RuntimeInstalling).await;

    orch.cancel().await.unwrap();
    let status = timeout(Duration::from_secs(5), orch.settled())
        .await
        .expect("cancelled run did not settle");
    assert_eq!(status.stage, RuntimeInstallFailed);
    assert_eq!(status.last_error, Some(SetupFailure::Cancelled));
    assert_eq!(
        orch.cancel().await,
        Err(OrchestratorError::NothingToCancel)
    );
}
