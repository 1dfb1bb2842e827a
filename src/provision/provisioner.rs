//! Create-or-reuse, readiness polling and schema setup.

use super::schema::preview;
use super::{ContainerRuntime, ContainerState, LineSink, ProvisionError, Schema};
use crate::{DatabaseSettings, OutputLine};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Bounded readiness polling schedule.
///
/// Delays grow exponentially from `initial_delay`, doubling each attempt,
/// and are capped at `max_delay`. Polling stops after `max_attempts` checks.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::ReadinessPolicy;
/// use std::time::Duration;
///
/// let policy = ReadinessPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Number of readiness checks before giving up.
    ///
    /// Default: 10
    pub max_attempts: u32,

    /// Delay after the first failed check.
    ///
    /// Default: 1 second
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    ///
    /// Default: 5 seconds
    pub max_delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReadinessPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Longest total time spent sleeping between checks.
    pub fn total_budget(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

/// Whether `port` can be bound on all host interfaces.
pub async fn host_port_available(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).await.is_ok()
}

/// Brings up the database container and its schema.
#[derive(Clone)]
pub struct ContainerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    settings: DatabaseSettings,
    readiness: ReadinessPolicy,
    schema: Schema,
}

impl ContainerProvisioner {
    /// Provisioner for `settings` with the application schema.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        settings: DatabaseSettings,
        readiness: ReadinessPolicy,
    ) -> Self {
        let schema = Schema::for_database(&settings.database);
        Self {
            runtime,
            settings,
            readiness,
            schema,
        }
    }

    /// Replace the schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// The container settings.
    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Ensure the container exists, is running and accepts connections.
    ///
    /// An existing container is reused: a stopped one is started, a running
    /// one is only polled. Safe to call again after a failure.
    pub async fn provision(&self, on_line: LineSink<'_>) -> Result<(), ProvisionError> {
        let name = self.settings.container_name.as_str();

        on_line(OutputLine::status("▶ Checking container runtime..."));
        self.runtime.ping().await?;

        match self.runtime.container_state(name).await? {
            ContainerState::Missing => {
                if !host_port_available(self.settings.host_port).await {
                    return Err(ProvisionError::PortInUse {
                        port: self.settings.host_port,
                    });
                }
                info!(container = %name, image = %self.settings.image, "creating database container");
                on_line(OutputLine::status(format!(
                    "▶ Creating container {} from {}...",
                    name, self.settings.image
                )));
                self.runtime
                    .create_container(&self.settings.container_spec(), &mut *on_line)
                    .await?;
            }
            ContainerState::Stopped => {
                info!(container = %name, "starting existing database container");
                on_line(OutputLine::status(format!("▶ Starting container {}...", name)));
                self.runtime.start_container(name, &mut *on_line).await?;
            }
            ContainerState::Running => {
                debug!(container = %name, "database container already running");
                on_line(OutputLine::status(format!("Container {} is already running", name)));
            }
        }

        let attempts = self.wait_ready(&mut *on_line).await?;
        on_line(OutputLine::status(format!(
            "✓ Database ready after {} check(s)",
            attempts
        )));
        Ok(())
    }

    /// Poll the database until it answers, returning the number of checks.
    ///
    /// Fails with [`ProvisionError::ReadinessTimeout`] once the policy is
    /// exhausted. Individual failed checks are not errors.
    pub async fn wait_ready(&self, on_line: LineSink<'_>) -> Result<u32, ProvisionError> {
        let name = self.settings.container_name.as_str();
        let ping = readiness_command();
        let max_attempts = self.readiness.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            on_line(OutputLine::status(format!(
                "Waiting for database ({}/{})...",
                attempt, max_attempts
            )));
            // Check output is noise while the server boots.
            match self.runtime.exec(name, &ping, &mut |_| {}).await {
                Ok(()) => return Ok(attempt),
                Err(e) => debug!(container = %name, attempt, error = %e, "database not ready"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.readiness.delay_for(attempt)).await;
            }
        }

        warn!(container = %name, attempts = max_attempts, "database never became ready");
        Err(ProvisionError::ReadinessTimeout {
            container: name.to_string(),
            attempts: max_attempts,
        })
    }

    /// Run every schema statement in order.
    ///
    /// Statements are create-if-not-exists, so re-running after a partial
    /// failure is safe.
    pub async fn initialize_schema(&self, on_line: LineSink<'_>) -> Result<(), ProvisionError> {
        let name = self.settings.container_name.as_str();
        for statement in self.schema.statements() {
            let summary = preview(statement);
            on_line(OutputLine::status(format!("▶ {}", summary)));
            self.runtime
                .exec(name, &sql_command(statement), &mut *on_line)
                .await
                .map_err(|e| ProvisionError::SchemaFailed {
                    statement: summary.clone(),
                    message: e.to_string(),
                })?;
        }
        info!(container = %name, statements = self.schema.statements().len(), "schema initialized");
        on_line(OutputLine::status("✓ Schema initialized"));
        Ok(())
    }
}

/// Readiness check run inside the container. The root password is read
/// from the container's own environment, so it never appears in argv.
fn readiness_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"mysqladmin ping -h 127.0.0.1 -uroot -p"$MYSQL_ROOT_PASSWORD" --silent"#.to_string(),
    ]
}

/// Run `statement` with the root client inside the container. The statement
/// is passed as a positional argument so it needs no shell quoting.
fn sql_command(statement: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"mysql -uroot -p"$MYSQL_ROOT_PASSWORD" -e "$1""#.to_string(),
        "sh".to_string(),
        statement.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ContainerSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted runtime recording the calls it receives.
    #[derive(Default)]
    struct ScriptedRuntime {
        state: Mutex<Option<ContainerState>>,
        ready_after: u32,
        exec_calls: Mutex<u32>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRuntime {
        fn with_state(state: ContainerState, ready_after: u32) -> Self {
            Self {
                state: Mutex::new(Some(state)),
                ready_after,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn ping(&self) -> Result<(), ProvisionError> {
            self.calls.lock().unwrap().push("ping".to_string());
            Ok(())
        }

        async fn container_state(&self, _name: &str) -> Result<ContainerState, ProvisionError> {
            Ok(self.state.lock().unwrap().unwrap_or(ContainerState::Missing))
        }

        async fn create_container(
            &self,
            spec: &ContainerSpec,
            on_line: LineSink<'_>,
        ) -> Result<(), ProvisionError> {
            self.calls.lock().unwrap().push(format!("create {}", spec.name));
            on_line(OutputLine::status("container id"));
            *self.state.lock().unwrap() = Some(ContainerState::Running);
            Ok(())
        }

        async fn start_container(
            &self,
            name: &str,
            _on_line: LineSink<'_>,
        ) -> Result<(), ProvisionError> {
            self.calls.lock().unwrap().push(format!("start {}", name));
            Ok(())
        }

        async fn exec(
            &self,
            _name: &str,
            _argv: &[String],
            _on_line: LineSink<'_>,
        ) -> Result<(), ProvisionError> {
            let mut n = self.exec_calls.lock().unwrap();
            *n += 1;
            if *n >= self.ready_after {
                Ok(())
            } else {
                Err(ProvisionError::Process(crate::SupervisorError::NonZeroExit {
                    program: "docker".to_string(),
                    code: 1,
                }))
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn settings() -> DatabaseSettings {
        DatabaseSettings {
            // Port 0 always binds, so the port check passes.
            host_port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let policy = ReadinessPolicy::default();
        let delays: Vec<_> = (1..=5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
        assert_eq!(policy.total_budget(), Duration::from_secs(1 + 2 + 4 + 5 * 6));
    }

    #[tokio::test]
    async fn test_missing_container_is_created() {
        let runtime = Arc::new(ScriptedRuntime::with_state(ContainerState::Missing, 1));
        let provisioner = ContainerProvisioner::new(runtime.clone(), settings(), fast_policy(3));

        let mut lines = Vec::new();
        provisioner.provision(&mut |l| lines.push(l.text)).await.unwrap();

        assert_eq!(runtime.calls(), vec!["ping", "create notes-mysql"]);
        assert!(lines.iter().any(|l| l == "container id"));
        assert!(lines.last().unwrap().starts_with("✓ Database ready"));
    }

    #[tokio::test]
    async fn test_stopped_container_is_started() {
        let runtime = Arc::new(ScriptedRuntime::with_state(ContainerState::Stopped, 1));
        let provisioner = ContainerProvisioner::new(runtime.clone(), settings(), fast_policy(3));
        provisioner.provision(&mut |_| {}).await.unwrap();
        assert_eq!(runtime.calls(), vec!["ping", "start notes-mysql"]);
    }

    #[tokio::test]
    async fn test_readiness_succeeds_within_budget() {
        let runtime = Arc::new(ScriptedRuntime::with_state(ContainerState::Running, 3));
        let provisioner = ContainerProvisioner::new(runtime, settings(), fast_policy(5));
        assert_eq!(provisioner.wait_ready(&mut |_| {}).await, Ok(3));
    }

    #[tokio::test]
    async fn test_readiness_timeout_is_bounded() {
        let runtime = Arc::new(ScriptedRuntime::with_state(ContainerState::Running, u32::MAX));
        let provisioner = ContainerProvisioner::new(runtime.clone(), settings(), fast_policy(4));

        let err = provisioner.provision(&mut |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            ProvisionError::ReadinessTimeout {
                container: "notes-mysql".to_string(),
                attempts: 4,
            }
        );
        assert_eq!(*runtime.exec_calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_port_in_use_blocks_creation() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runtime = Arc::new(ScriptedRuntime::with_state(ContainerState::Missing, 1));
        let provisioner = ContainerProvisioner::new(
            runtime.clone(),
            DatabaseSettings {
                host_port: port,
                ..Default::default()
            },
            fast_policy(1),
        );

        assert_eq!(
            provisioner.provision(&mut |_| {}).await,
            Err(ProvisionError::PortInUse { port })
        );
        assert_eq!(runtime.calls(), vec!["ping"]);
    }

    #[test]
    fn test_commands_keep_secrets_out_of_argv() {
        let settings = DatabaseSettings::default();
        let argv = sql_command("SELECT 1");
        assert!(argv.iter().all(|a| !a.contains(&settings.root_password)));
        assert_eq!(argv.last().unwrap(), "SELECT 1");
        assert!(readiness_command()[2].contains("$MYSQL_ROOT_PASSWORD"));
    }
}
