//! The container runtime seam.

use super::ProvisionError;
use crate::OutputLine;
use async_trait::async_trait;

/// Receives output lines while a runtime command runs.
pub type LineSink<'a> = &'a mut (dyn FnMut(OutputLine) + Send);

/// Observed state of a named container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with that name exists.
    Missing,
    /// The container exists but is not running.
    Stopped,
    /// The container is running.
    Running,
}

/// A container to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment passed to the container (key, value pairs).
    pub env: Vec<(String, String)>,
    /// Host side of the published port.
    pub host_port: u16,
    /// Container side of the published port.
    pub container_port: u16,
    /// Named volume holding the data directory.
    pub volume: String,
    /// Where the volume is mounted in the container.
    pub mount_path: String,
}

/// Operations the provisioner needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime daemon answers.
    async fn ping(&self) -> Result<(), ProvisionError>;

    /// State of the container called `name`.
    async fn container_state(&self, name: &str) -> Result<ContainerState, ProvisionError>;

    /// Create and start a container, creating its volume if needed.
    async fn create_container(
        &self,
        spec: &ContainerSpec,
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError>;

    /// Start an existing, stopped container.
    async fn start_container(&self, name: &str, on_line: LineSink<'_>)
        -> Result<(), ProvisionError>;

    /// Run `argv` inside a running container.
    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        on_line: LineSink<'_>,
    ) -> Result<(), ProvisionError>;
}
