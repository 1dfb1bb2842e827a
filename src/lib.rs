//! # runtime-bootstrap
//!
//! First-launch environment bootstrap for desktop applications backed by a
//! containerized database.
//!
//! On first launch the [`Orchestrator`] detects the host platform, installs
//! the container runtime if it is missing (asking the operator for an
//! elevation credential where the platform needs one), provisions and
//! starts the database container, and initializes its schema. Every stage
//! transition and every line of installer and container output is
//! published to subscribers as it happens.
//!
//! ## Features
//!
//! - [`InstallationStage`] state machine with a pure transition table
//!   ([`machine::apply`]) shared by all platforms, parameterized by
//!   [`PlatformProfile`] capability flags
//! - [`ProcessSupervisor`] streaming child output line by line, with
//!   distinct non-zero and abnormal exit reporting
//! - [`PrivilegeChannel`] correlating credential requests and answers by id
//! - [`ContainerProvisioner`] with bounded readiness polling and an
//!   idempotent [`Schema`]
//! - [`EventReporter`] fan-out with bounded per-subscriber queues
//!
//! ## Example
//!
//! ```rust,no_run
//! use runtime_bootstrap::{InstallationStage, Orchestrator, SetupOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Orchestrator::system(SetupOptions::default());
//!     if let Err(e) = orchestrator.start_setup().await {
//!         eprintln!("{}. {}", e, e.fix_suggestion());
//!         return;
//!     }
//!
//!     let status = orchestrator.settled().await;
//!     match status.last_error {
//!         None if status.stage == InstallationStage::SetupComplete => println!("ready"),
//!         Some(e) => println!("failed: {}. Fix: {}", e, e.fix_suggestion()),
//!         None => println!("paused at {}", status.stage),
//!     }
//! }
//! ```

mod config;
mod events;
mod installer;
pub mod machine;
mod orchestrator;
mod platform;
mod privilege;
mod probe;
mod provision;
mod session;
mod stage;
mod supervisor;

pub use config::{ConfigError, DatabaseSettings, SetupOptions};
pub use events::{EventReporter, EventStream, LogEvent, SetupEvent, StageEvent, DEFAULT_EVENT_BUFFER};
pub use installer::{install_plan, INSTALL_DOCS_URL, WINDOWS_INSTALLER_URL};
pub use machine::{Trigger, TransitionError};
pub use orchestrator::{Orchestrator, OrchestratorError, SessionStatus};
pub use platform::{PlatformInfo, PlatformKind, PlatformProfile};
pub use privilege::{
    ChannelError, PendingCredential, PrivilegeChannel, PrivilegeRequest, RequestId, Secret,
};
pub use probe::{
    check_supported_version, required_tools, CapabilityProbe, ProbeError, SystemProbe,
    SystemProbeOptions,
};
pub use provision::{
    host_port_available, ContainerProvisioner, ContainerRuntime, ContainerSpec, ContainerState,
    DockerCli, LineSink, ProvisionError, ReadinessPolicy, Schema,
};
pub use session::{LogLine, LogSource, SetupFailure, SetupSession};
pub use stage::{InstallationStage, UnknownStage};
pub use supervisor::{
    CapturedOutput, CommandSpec, Elevator, ExitReport, OutputLine, OutputStream,
    ProcessSupervisor, SupervisorError, SupervisorOptions,
};
