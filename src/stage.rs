//! Installation stage tags and their wire representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// A named point in the installation sequence.
///
/// Exactly one stage is current for a setup session. The variants are listed
/// in their canonical order; the credential sub-path
/// (`AwaitingPrivilegedCredential`) only occurs on platforms that require
/// interactive elevation, and `AwaitingStart` only on platforms that require
/// operator confirmation before anything runs.
///
/// Stages cross the process boundary as strings through an explicit mapping
/// table ([`InstallationStage::as_str`] / [`FromStr`]), never through derived
/// names, so adding a variant without extending the table fails to compile.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::InstallationStage;
///
/// let stage: InstallationStage = "ContainerStarted".parse().unwrap();
/// assert_eq!(stage, InstallationStage::ContainerStarted);
/// assert_eq!(stage.as_str(), "ContainerStarted");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter)]
pub enum InstallationStage {
    /// No setup has been requested yet.
    NotStarted,
    /// Paused until the operator confirms the setup may proceed.
    AwaitingStart,
    /// Waiting for the operator to supply an elevation credential.
    AwaitingPrivilegedCredential,
    /// Querying the host for the container runtime.
    ProbingRuntime,
    /// The container runtime is not installed.
    RuntimeAbsent,
    /// The runtime installer is running.
    RuntimeInstalling,
    /// Probing or installing the runtime failed.
    RuntimeInstallFailed,
    /// The container runtime is available.
    RuntimeInstalled,
    /// Creating, starting and waiting on the database container.
    ContainerProvisioning,
    /// The database container accepts connections.
    ContainerStarted,
    /// Provisioning the container or its schema failed.
    ContainerSetupFailed,
    /// Setup finished; the application may use the database.
    SetupComplete,
}

impl InstallationStage {
    /// Wire name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::AwaitingStart => "AwaitingStart",
            Self::AwaitingPrivilegedCredential => "AwaitingPrivilegedCredential",
            Self::ProbingRuntime => "ProbingRuntime",
            Self::RuntimeAbsent => "RuntimeAbsent",
            Self::RuntimeInstalling => "RuntimeInstalling",
            Self::RuntimeInstallFailed => "RuntimeInstallFailed",
            Self::RuntimeInstalled => "RuntimeInstalled",
            Self::ContainerProvisioning => "ContainerProvisioning",
            Self::ContainerStarted => "ContainerStarted",
            Self::ContainerSetupFailed => "ContainerSetupFailed",
            Self::SetupComplete => "SetupComplete",
        }
    }

    /// Canonical completion percentage for progress displays.
    ///
    /// One table for every platform. Failed stages report the progress of
    /// the phase they failed in.
    ///
    /// ```rust
    /// use runtime_bootstrap::InstallationStage;
    ///
    /// assert_eq!(InstallationStage::NotStarted.progress_percent(), 0);
    /// assert_eq!(InstallationStage::SetupComplete.progress_percent(), 100);
    /// ```
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::AwaitingStart => 5,
            Self::ProbingRuntime => 10,
            Self::RuntimeAbsent => 20,
            Self::AwaitingPrivilegedCredential => 25,
            Self::RuntimeInstalling => 30,
            Self::RuntimeInstallFailed => 30,
            Self::RuntimeInstalled => 50,
            Self::ContainerProvisioning => 60,
            Self::ContainerSetupFailed => 60,
            Self::ContainerStarted => 85,
            Self::SetupComplete => 100,
        }
    }

    /// Whether this is one of the sticky `*Failed` stages.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::RuntimeInstallFailed | Self::ContainerSetupFailed)
    }

    /// Whether the machine stops here until an operator acts.
    pub fn is_terminal(&self) -> bool {
        self.is_failed() || matches!(self, Self::SetupComplete)
    }

    /// Whether the stage belongs to the container phase of setup.
    pub fn is_container_phase(&self) -> bool {
        matches!(
            self,
            Self::RuntimeInstalled
                | Self::ContainerProvisioning
                | Self::ContainerStarted
                | Self::ContainerSetupFailed
        )
    }

    /// The failure stage of the phase this stage belongs to.
    pub fn failure_stage(&self) -> InstallationStage {
        if self.is_container_phase() {
            Self::ContainerSetupFailed
        } else {
            Self::RuntimeInstallFailed
        }
    }

    /// Iterator over every stage in canonical order.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }
}

impl fmt::Display for InstallationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized installation stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for InstallationStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stage = match s {
            "NotStarted" => Self::NotStarted,
            "AwaitingStart" => Self::AwaitingStart,
            "AwaitingPrivilegedCredential" => Self::AwaitingPrivilegedCredential,
            "ProbingRuntime" => Self::ProbingRuntime,
            "RuntimeAbsent" => Self::RuntimeAbsent,
            "RuntimeInstalling" => Self::RuntimeInstalling,
            "RuntimeInstallFailed" => Self::RuntimeInstallFailed,
            "RuntimeInstalled" => Self::RuntimeInstalled,
            "ContainerProvisioning" => Self::ContainerProvisioning,
            "ContainerStarted" => Self::ContainerStarted,
            "ContainerSetupFailed" => Self::ContainerSetupFailed,
            "SetupComplete" => Self::SetupComplete,
            other => return Err(UnknownStage(other.to_string())),
        };
        Ok(stage)
    }
}

impl Serialize for InstallationStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstallationStage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mapping_table_round_trips_every_stage() {
        for stage in InstallationStage::all() {
            let parsed: InstallationStage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_wire_names_are_unique() {
        let names: HashSet<_> = InstallationStage::all().map(|s| s.as_str()).collect();
        assert_eq!(names.len(), InstallationStage::all().count());
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = "DockerInstalling".parse::<InstallationStage>().unwrap_err();
        assert_eq!(err, UnknownStage("DockerInstalling".to_string()));
    }

    #[test]
    fn test_serde_uses_mapping_table() {
        let json = serde_json::to_string(&InstallationStage::RuntimeAbsent).unwrap();
        assert_eq!(json, "\"RuntimeAbsent\"");

        let back: InstallationStage = serde_json::from_str("\"SetupComplete\"").unwrap();
        assert_eq!(back, InstallationStage::SetupComplete);

        assert!(serde_json::from_str::<InstallationStage>("\"Bogus\"").is_err());
    }

    #[test]
    fn test_progress_is_monotonic_along_happy_path() {
        let path = [
            InstallationStage::NotStarted,
            InstallationStage::AwaitingStart,
            InstallationStage::ProbingRuntime,
            InstallationStage::RuntimeAbsent,
            InstallationStage::AwaitingPrivilegedCredential,
            InstallationStage::RuntimeInstalling,
            InstallationStage::RuntimeInstalled,
            InstallationStage::ContainerProvisioning,
            InstallationStage::ContainerStarted,
            InstallationStage::SetupComplete,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].progress_percent() <= pair[1].progress_percent(),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_failure_stage_by_phase() {
        assert_eq!(
            InstallationStage::ProbingRuntime.failure_stage(),
            InstallationStage::RuntimeInstallFailed
        );
        assert_eq!(
            InstallationStage::AwaitingPrivilegedCredential.failure_stage(),
            InstallationStage::RuntimeInstallFailed
        );
        assert_eq!(
            InstallationStage::ContainerStarted.failure_stage(),
            InstallationStage::ContainerSetupFailed
        );
    }

    #[test]
    fn test_terminal_stages() {
        let terminal: Vec<_> = InstallationStage::all().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                InstallationStage::RuntimeInstallFailed,
                InstallationStage::ContainerSetupFailed,
                InstallationStage::SetupComplete,
            ]
        );
    }
}
