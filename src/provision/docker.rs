//! [`ContainerRuntime`] backed by the `docker` CLI.

use super::{ContainerRuntime, ContainerSpec, ContainerState, LineSink, ProvisionError};
use crate::{CommandSpec, OutputLine, ProcessSupervisor, SupervisorOptions};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Time allowed for status queries (`docker info`, `docker ps`).
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives containers through the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    supervisor: ProcessSupervisor,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(10 * 60))
    }
}

impl DockerCli {
    /// Client running `program`, killing any single command after
    /// `command_timeout`.
    pub fn new(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            supervisor: ProcessSupervisor::new(SupervisorOptions {
                timeout: command_timeout,
                ..Default::default()
            }),
        }
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.program.clone()).args(args)
    }

    /// Run a runtime command, streaming its output to `on_line`.
    async fn stream(&self, cmd: CommandSpec, on_line: LineSink<'_>) -> Result<(), ProvisionError> {
        on_line(OutputLine::status(format!("$ {}", cmd.display())));
        self.supervisor.run(&cmd, None, &mut *on_line).await?;
        Ok(())
    }
}

/// Docker ps filter matching exactly `name`.
fn exact_name_filter(name: &str) -> String {
    format!("name=^/{}$", name)
}

pub(crate) fn parse_state(ps_output: &str) -> ContainerState {
    match ps_output.lines().map(str::trim).find(|l| !l.is_empty()) {
        None => ContainerState::Missing,
        Some(state) if state.eq_ignore_ascii_case("running") => ContainerState::Running,
        Some(_) => ContainerState::Stopped,
    }
}

/// `docker run` argument list for `spec`. Environment values are not part
/// of it; only the keys are named and the values come from the CLI's own
/// environment.
pub(crate) fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for (key, _) in &spec.env {
        args.push("-e".to_string());
        args.push(key.clone());
    }
    args.push("-p".to_string());
    args.push(format!("{}:{}", spec.host_port, spec.container_port));
    args.push("-v".to_string());
    args.push(format!("{}:{}", spec.volume, spec.mount_path));
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<(), ProvisionError> {
        let cmd = self.command(["info", "--format", "{{.ServerVersion}}"]);
        let output = self.supervisor.capture(&cmd, QUERY_TIMEOUT).await?;
        if output.success() {
            debug!(server = %output.stdout.trim(), "container runtime reachable");
            Ok(())
        } else {
            Err(ProvisionError::RuntimeUnavailable {
                message: output.stderr.trim().to_string(),
            })
        }
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState, ProvisionError> {
        let filter = exact_name_filter(name);
        let cmd = self.command(["ps", "-a", "--filter", filter.as_str(), "--format", "{{.State}}"]);
        let output = self.supervisor.capture(&cmd, QUERY_TIMEOUT).await?;
        if !output.success() {
            return Err(ProvisionError::RuntimeUnavailable {
                message: output.stderr.trim().to_string(),
            });
        }
        let state = parse_state(&output.stdout);
        debug!(container = %name, ?state, "container state");
        Ok(state)
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        let create_failed = |e: crate::SupervisorError| ProvisionError::CreateFailed {
            container: spec.name.clone(),
            message: e.to_string(),
        };

        // `volume create` is a no-op for an existing volume.
        let volume = self
            .command(["volume", "create", spec.volume.as_str()])
            .describe("Creating data volume");
        on_line(OutputLine::status(format!("$ {}", volume.display())));
        self.supervisor
            .run(&volume, None, &mut *on_line)
            .await
            .map_err(create_failed)?;

        let mut run = self.command(run_args(spec)).describe("Creating database container");
        for (key, value) in &spec.env {
            run = run.env(key.clone(), value.clone());
        }
        on_line(OutputLine::status(format!("$ {}", run.display())));
        self.supervisor
            .run(&run, None, &mut *on_line)
            .await
            .map_err(create_failed)?;
        Ok(())
    }

    async fn start_container(
        &self,
        name: &str,
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        let cmd = self.command(["start", name]).describe("Starting database container");
        self.stream(cmd, on_line)
            .await
            .map_err(|e| ProvisionError::StartFailed {
                container: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError> {
        let cmd = self
            .command(["exec".to_string(), name.to_string()])
            .args(argv.iter().cloned());
        self.supervisor.run(&cmd, None, &mut *on_line).await?;
        Ok(())
    }
}
