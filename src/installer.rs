//! Per-platform container runtime install plans.
//!
//! Each plan is a single [`CommandSpec`] so the supervisor runs it as one
//! process and one credential covers the whole install. Plans print a
//! `▶ description...` marker before every step so the install log reads as
//! a step list.

use crate::platform::PlatformKind;
use crate::CommandSpec;

/// Where to send operators whose platform has no automatic install.
pub const INSTALL_DOCS_URL: &str = "https://docs.docker.com/engine/install/";

/// Windows installer download location.
pub const WINDOWS_INSTALLER_URL: &str =
    "https://desktop.docker.com/win/main/amd64/Docker%20Desktop%20Installer.exe";

/// A shell step of the Linux install script.
struct Step {
    description: &'static str,
    command: &'static str,
    /// Failure of this step does not abort the install.
    tolerant: bool,
}

const LINUX_STEPS: &[Step] = &[
    Step {
        description: "Removing old Docker packages",
        command: "apt-get remove --purge -y docker docker-engine docker.io containerd runc",
        tolerant: true,
    },
    Step {
        description: "Cleaning up unused dependencies",
        command: "apt-get autoremove -y",
        tolerant: true,
    },
    Step {
        description: "Updating package list",
        command: "apt-get update",
        tolerant: false,
    },
    Step {
        description: "Downloading Docker install script",
        command: "curl -fsSL https://get.docker.com -o /tmp/get-docker.sh",
        tolerant: false,
    },
    Step {
        description: "Installing Docker engine",
        command: "sh /tmp/get-docker.sh",
        tolerant: false,
    },
    Step {
        description: "Configuring user permissions",
        command: "usermod -aG docker \"${SUDO_USER:-$USER}\"",
        tolerant: false,
    },
    Step {
        description: "Enabling Docker service",
        command: "systemctl enable --now docker",
        tolerant: false,
    },
    Step {
        description: "Setting Docker socket permissions",
        command: "chmod 666 /var/run/docker.sock",
        tolerant: true,
    },
];

/// The command that installs the container runtime on `kind`.
///
/// Returns `None` for platforms without an automatic install.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::{install_plan, PlatformKind};
///
/// let linux = install_plan(PlatformKind::Linux).unwrap();
/// assert!(linux.privileged);
/// assert!(install_plan(PlatformKind::Unknown).is_none());
/// ```
pub fn install_plan(kind: PlatformKind) -> Option<CommandSpec> {
    match kind {
        PlatformKind::Linux => Some(
            CommandSpec::new("sh")
                .args(["-c".to_string(), linux_script()])
                .privileged()
                .describe("Installing Docker engine"),
        ),
        // The installer raises its own UAC prompt.
        PlatformKind::Windows => Some(
            CommandSpec::new("powershell")
                .args([
                    "-NoProfile".to_string(),
                    "-ExecutionPolicy".to_string(),
                    "Bypass".to_string(),
                    "-Command".to_string(),
                    windows_script(),
                ])
                .describe("Installing Docker Desktop"),
        ),
        PlatformKind::MacOS => Some(
            CommandSpec::new("brew")
                .args(["install", "--cask", "docker"])
                .describe("Installing Docker Desktop"),
        ),
        PlatformKind::Unknown => None,
    }
}

fn linux_script() -> String {
    let mut script = String::from("set -e\n");
    for step in LINUX_STEPS {
        script.push_str(&format!("echo \"▶ {}...\"\n", step.description));
        if step.tolerant {
            script.push_str(&format!("{} || true\n", step.command));
        } else {
            script.push_str(step.command);
            script.push('\n');
        }
    }
    script.push_str("echo \"✓ Docker installed\"\n");
    script
}

fn windows_script() -> String {
    format!(
        r#"$ErrorActionPreference = 'Stop'
$installer = Join-Path $env:TEMP 'DockerDesktopInstaller.exe'
Write-Host '▶ Downloading Docker Desktop installer...'
Invoke-WebRequest -UseBasicParsing -Uri '{url}' -OutFile $installer
try {{
    Write-Host '▶ Installing Docker Desktop...'
    $process = Start-Process -FilePath $installer -ArgumentList 'install','--quiet','--accept-license' -Wait -PassThru -Verb RunAs
    if ($process.ExitCode -ne 0) {{ throw "installer exited with code $($process.ExitCode)" }}
    Write-Host '▶ Starting Docker Desktop...'
    Start-Process -FilePath (Join-Path $env:ProgramFiles 'Docker\Docker\Docker Desktop.exe')
    $retries = 0
    while ($retries -lt 12) {{
        $service = Get-Service -Name 'com.docker.service' -ErrorAction SilentlyContinue
        if ($service -and $service.Status -eq 'Running') {{ Write-Host '✓ Docker Desktop is running'; exit 0 }}
        Start-Sleep -Seconds 10
        $retries++
        Write-Host "Waiting for Docker service... ($retries/12)"
    }}
    throw 'Docker service did not start'
}} finally {{
    if (Test-Path $installer) {{ Remove-Item -Force $installer }}
}}"#,
        url = WINDOWS_INSTALLER_URL
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlatformProfile;

    #[test]
    fn test_every_supported_platform_has_a_plan() {
        for kind in PlatformKind::all() {
            assert_eq!(install_plan(kind).is_some(), kind != PlatformKind::Unknown);
        }
    }

    #[test]
    fn test_privilege_matches_profile() {
        // Only platforms that take an operator credential run the plan elevated.
        for kind in PlatformKind::all() {
            if let Some(plan) = install_plan(kind) {
                assert_eq!(
                    plan.privileged,
                    PlatformProfile::for_kind(kind).requires_interactive_elevation,
                    "{:?}",
                    kind
                );
            }
        }
    }

    #[test]
    fn test_linux_script_shape() {
        let script = linux_script();
        assert!(script.starts_with("set -e\n"));
        assert!(script.contains("echo \"▶ Updating package list...\"\napt-get update\n"));
        assert!(script.contains("chmod 666 /var/run/docker.sock || true\n"));
        assert!(!script.contains("apt-get update || true"));
        assert!(!script.contains("sudo"));
    }

    #[test]
    fn test_windows_script_elevates_through_uac() {
        let plan = install_plan(PlatformKind::Windows).unwrap();
        let script = plan.args.last().unwrap();
        assert!(script.contains("-Verb RunAs"));
        assert!(script.contains(WINDOWS_INSTALLER_URL));
    }
}
