//! Database container provisioning.
//!
//! [`ContainerProvisioner`] drives a [`ContainerRuntime`] to create or
//! reuse the database container, start it, and poll it until it accepts
//! connections, then applies an idempotent [`Schema`].

mod docker;
mod errors;
mod provisioner;
mod runtime;
mod schema;

pub use docker::DockerCli;
pub use errors::ProvisionError;
pub use provisioner::{host_port_available, ContainerProvisioner, ReadinessPolicy};
pub use runtime::{ContainerRuntime, ContainerSpec, ContainerState, LineSink};
pub use schema::Schema;
