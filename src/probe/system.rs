//! Capability probe backed by the real host.

use super::lookup::find_executable;
use super::parse::{first_line, parse_os_release, parse_version, parse_windows_ver};
use super::{required_tools, CapabilityProbe, ProbeError};
use crate::platform::{PlatformInfo, PlatformKind};
use crate::{CommandSpec, ProcessSupervisor};
use async_trait::async_trait;
use semver::Version;
use std::time::Duration;
use tracing::debug;

/// Options for [`SystemProbe`].
#[derive(Debug, Clone)]
pub struct SystemProbeOptions {
    /// Platform to report. Defaults to the platform of the running process.
    pub platform: PlatformKind,

    /// Container runtime CLI to look for.
    ///
    /// Default: `docker`
    pub runtime_program: String,

    /// Time allowed for each query command.
    ///
    /// Default: 5 seconds.
    pub query_timeout: Duration,
}

impl Default for SystemProbeOptions {
    fn default() -> Self {
        Self {
            platform: PlatformKind::current(),
            runtime_program: "docker".to_string(),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Answers capability queries by inspecting the host.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    options: SystemProbeOptions,
    supervisor: ProcessSupervisor,
}

impl SystemProbe {
    /// Create a probe.
    pub fn new(options: SystemProbeOptions) -> Self {
        Self {
            options,
            supervisor: ProcessSupervisor::default(),
        }
    }

    /// Version of the installed runtime, `None` when it is not installed.
    ///
    /// A runtime binary that exists but fails its `--version` query is
    /// reported as not installed; a reinstall repairs it.
    pub async fn runtime_version(&self) -> Result<Option<Version>, ProbeError> {
        let Some(path) = find_executable(&self.options.runtime_program) else {
            debug!(program = %self.options.runtime_program, "runtime not found on PATH");
            return Ok(None);
        };

        let cmd = CommandSpec::new(path.to_string_lossy()).args(["--version"]);
        let output = self
            .supervisor
            .capture(&cmd, self.options.query_timeout)
            .await
            .map_err(|e| ProbeError::QueryFailed {
                query: "runtime version".to_string(),
                message: e.to_string(),
            })?;

        if !output.success() {
            debug!(path = %path.display(), code = ?output.exit_code, "runtime version query failed");
            return Ok(None);
        }

        // Some tools print their banner on stderr.
        let text = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = parse_version(text)?;
        debug!(path = %path.display(), %version, "runtime found");
        Ok(Some(version))
    }

    /// Check that every tool in `tools` can be found.
    pub fn check_tools(&self, tools: &[&str]) -> Result<(), ProbeError> {
        match tools.iter().find(|tool| find_executable(tool).is_none()) {
            Some(missing) => Err(ProbeError::MissingPrerequisite {
                tool: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn query(&self, query: &str, cmd: CommandSpec) -> Result<String, ProbeError> {
        let failed = |message: String| ProbeError::QueryFailed {
            query: query.to_string(),
            message,
        };
        let output = self
            .supervisor
            .capture(&cmd, self.options.query_timeout)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !output.success() {
            return Err(failed(format!(
                "{} exited with {:?}: {}",
                cmd.display(),
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn os_release(&self) -> Result<Option<String>, ProbeError> {
        match self.options.platform {
            PlatformKind::Linux => {
                if find_executable("lsb_release").is_some() {
                    let out = self
                        .query("OS release", CommandSpec::new("lsb_release").args(["-r", "-s"]))
                        .await?;
                    return Ok(first_line(&out));
                }
                let contents = std::fs::read_to_string("/etc/os-release").map_err(|e| {
                    ProbeError::QueryFailed {
                        query: "OS release".to_string(),
                        message: format!("/etc/os-release: {}", e),
                    }
                })?;
                Ok(parse_os_release(&contents))
            }
            PlatformKind::MacOS => {
                let out = self
                    .query("OS release", CommandSpec::new("sw_vers").args(["-productVersion"]))
                    .await?;
                Ok(first_line(&out))
            }
            PlatformKind::Windows => {
                let out = self
                    .query("OS release", CommandSpec::new("cmd").args(["/c", "ver"]))
                    .await?;
                Ok(parse_windows_ver(&out))
            }
            PlatformKind::Unknown => Ok(None),
        }
    }
}

#[async_trait]
impl CapabilityProbe for SystemProbe {
    async fn detect_os(&self) -> Result<PlatformInfo, ProbeError> {
        let version = self.os_release().await?;
        let info = PlatformInfo {
            kind: self.options.platform,
            version,
            arch: std::env::consts::ARCH.to_string(),
        };
        debug!(platform = ?info.kind, version = ?info.version, arch = %info.arch, "platform detected");
        Ok(info)
    }

    async fn is_runtime_installed(&self) -> Result<bool, ProbeError> {
        Ok(self.runtime_version().await?.is_some())
    }

    async fn check_prerequisites(&self, platform: &PlatformInfo) -> Result<(), ProbeError> {
        self.check_tools(required_tools(platform.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_for(runtime_program: &str) -> SystemProbe {
        SystemProbe::new(SystemProbeOptions {
            runtime_program: runtime_program.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_missing_runtime_is_not_installed() {
        let probe = probe_for("definitely_not_a_real_runtime_12345");
        assert_eq!(probe.is_runtime_installed().await, Ok(false));
        assert_eq!(probe.runtime_version().await, Ok(None));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_tools() {
        let probe = SystemProbe::default();
        assert!(probe.check_tools(&["sh"]).is_ok());
        assert_eq!(
            probe.check_tools(&["sh", "definitely_not_a_real_tool_12345"]),
            Err(ProbeError::MissingPrerequisite {
                tool: "definitely_not_a_real_tool_12345".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_platform_has_no_release() {
        let probe = SystemProbe::new(SystemProbeOptions {
            platform: PlatformKind::Unknown,
            ..Default::default()
        });
        let info = probe.detect_os().await.unwrap();
        assert_eq!(info.kind, PlatformKind::Unknown);
        assert_eq!(info.version, None);
        assert!(probe.check_prerequisites(&info).await.is_ok());
    }

    #[test]
    fn test_default_options() {
        let options = SystemProbeOptions::default();
        assert_eq!(options.runtime_program, "docker");
        assert_eq!(options.platform, PlatformKind::current());
        assert_eq!(options.query_timeout, Duration::from_secs(5));
    }
}
