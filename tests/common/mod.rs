//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use runtime_bootstrap::{
    CapabilityProbe, ContainerRuntime, ContainerSpec, ContainerState, Elevator, InstallationStage,
    LineSink, LogEvent, Orchestrator, OutputLine, PlatformInfo, PlatformKind, PlatformProfile,
    ProbeError, ProvisionError, ReadinessPolicy, SetupEvent, SetupOptions, SupervisorError,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Probe answering from a script. The last runtime answer repeats.
pub struct FakeProbe {
    kind: PlatformKind,
    detect_failures: Mutex<u32>,
    runtime_answers: Mutex<VecDeque<bool>>,
}

impl FakeProbe {
    pub fn new(kind: PlatformKind, runtime_answers: &[bool]) -> Self {
        Self {
            kind,
            detect_failures: Mutex::new(0),
            runtime_answers: Mutex::new(runtime_answers.iter().copied().collect()),
        }
    }

    /// Fail the next `n` `detect_os` calls.
    pub fn failing_detect(self, n: u32) -> Self {
        *self.detect_failures.lock().unwrap() = n;
        self
    }
}

#[async_trait]
impl CapabilityProbe for FakeProbe {
    async fn detect_os(&self) -> Result<PlatformInfo, ProbeError> {
        let mut failures = self.detect_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ProbeError::QueryFailed {
                query: "OS release".to_string(),
                message: "lsb_release timed out".to_string(),
            });
        }
        Ok(PlatformInfo {
            kind: self.kind,
            version: Some("22.04".to_string()),
            arch: "x86_64".to_string(),
        })
    }

    async fn is_runtime_installed(&self) -> Result<bool, ProbeError> {
        let mut answers = self.runtime_answers.lock().unwrap();
        let answer = answers.front().copied().unwrap_or(false);
        if answers.len() > 1 {
            answers.pop_front();
        }
        Ok(answer)
    }
}

/// In-memory container runtime.
///
/// Readiness checks fail until `ready` is set. SQL statements are recorded;
/// re-running an unguarded `CREATE` fails the way a real server would.
pub struct FakeRuntime {
    pub state: Mutex<ContainerState>,
    pub ready: Mutex<bool>,
    pub readiness_checks: Mutex<u32>,
    pub applied: Mutex<HashSet<String>>,
    pub executed: Mutex<Vec<String>>,
    /// Statement index (0-based) to fail once.
    pub fail_statement_once: Mutex<Option<usize>>,
    statement_index: Mutex<usize>,
    pub created: Mutex<u32>,
}

impl FakeRuntime {
    pub fn ready() -> Self {
        Self {
            state: Mutex::new(ContainerState::Missing),
            ready: Mutex::new(true),
            readiness_checks: Mutex::new(0),
            applied: Mutex::new(HashSet::new()),
            executed: Mutex::new(Vec::new()),
            fail_statement_once: Mutex::new(None),
            statement_index: Mutex::new(0),
            created: Mutex::new(0),
        }
    }

    pub fn never_ready() -> Self {
        let runtime = Self::ready();
        *runtime.ready.lock().unwrap() = false;
        runtime
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }

    fn run_sql(&self, statement: &str, on_line: LineSink<'_>) -> Result<(), ProvisionError> {
        let index = {
            let mut index = self.statement_index.lock().unwrap();
            let current = *index;
            *index += 1;
            current
        };
        self.executed.lock().unwrap().push(statement.to_string());

        let mut fail = self.fail_statement_once.lock().unwrap();
        if *fail == Some(index) {
            *fail = None;
            on_line(OutputLine::status("ERROR 2013 (HY000): Lost connection"));
            return Err(ProvisionError::Process(SupervisorError::NonZeroExit {
                program: "docker".to_string(),
                code: 1,
            }));
        }

        let guarded = statement.to_uppercase().contains("IF NOT EXISTS");
        let mut applied = self.applied.lock().unwrap();
        if !applied.insert(statement.to_string()) && !guarded {
            on_line(OutputLine::status("ERROR 1050 (42S01): already exists"));
            return Err(ProvisionError::Process(SupervisorError::NonZeroExit {
                program: "docker".to_string(),
                code: 1,
            }));
        }
        on_line(OutputLine::status("Query OK"));
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn container_state(&self, _name: &str) -> Result<ContainerState, ProvisionError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        *self.created.lock().unwrap() += 1;
        *self.state.lock().unwrap() = ContainerState::Running;
        on_line(OutputLine::status(format!("created {}", spec.name)));
        Ok(())
    }

    async fn start_container(
        &self,
        _name: &str,
        _on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        *self.state.lock().unwrap() = ContainerState::Running;
        Ok(())
    }

    async fn exec(
        &self,
        _name: &str,
        argv: &[String],
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        let script = argv.get(2).map(String::as_str).unwrap_or_default();
        if script.contains("mysqladmin") {
            *self.readiness_checks.lock().unwrap() += 1;
            return if *self.ready.lock().unwrap() {
                Ok(())
            } else {
                Err(ProvisionError::Process(SupervisorError::NonZeroExit {
                    program: "docker".to_string(),
                    code: 1,
                }))
            };
        }
        let statement = argv.last().map(String::as_str).unwrap_or_default();
        self.run_sql(statement, on_line)
    }
}

/// Options with fast readiness polling and a free host port.
pub fn fast_options() -> SetupOptions {
    let mut options = SetupOptions {
        readiness: ReadinessPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        elevator: Elevator {
            program: "env".to_string(),
            args: Vec::new(),
        },
        ..Default::default()
    };
    // Port 0 always binds, so the host port check passes.
    options.database.host_port = 0;
    options
}

pub fn orchestrator(
    kind: PlatformKind,
    probe: FakeProbe,
    runtime: Arc<FakeRuntime>,
    options: SetupOptions,
) -> Orchestrator {
    Orchestrator::new(PlatformProfile::for_kind(kind), Arc::new(probe), runtime, options)
}

pub fn stages(events: &[SetupEvent]) -> Vec<InstallationStage> {
    events
        .iter()
        .filter_map(|e| match e {
            SetupEvent::Stage(s) => Some(s.stage),
            _ => None,
        })
        .collect()
}

pub fn logs(events: &[SetupEvent]) -> Vec<LogEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            SetupEvent::Log(l) => Some(l.clone()),
            _ => None,
        })
        .collect()
}

pub fn credential_requests(events: &[SetupEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SetupEvent::CredentialRequested { .. }))
        .count()
}
