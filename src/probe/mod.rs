//! Capability probing.
//!
//! Stateless queries about the host: which platform this is, whether the
//! container runtime is installed, and whether the tools setup relies on
//! are available. A query that cannot be answered fails with
//! [`ProbeError`]; it is never defaulted to "absent".

mod errors;
mod lookup;
mod parse;
mod system;

pub use errors::ProbeError;
pub use system::{SystemProbe, SystemProbeOptions};

use crate::platform::{PlatformInfo, PlatformKind};
use async_trait::async_trait;

/// Host facts the orchestrator needs.
///
/// [`SystemProbe`] answers from the real host; tests substitute fakes.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Identify the platform and its release.
    async fn detect_os(&self) -> Result<PlatformInfo, ProbeError>;

    /// Whether the container runtime CLI is installed and answers.
    async fn is_runtime_installed(&self) -> Result<bool, ProbeError>;

    /// Check that the tools the runtime installer needs are present.
    async fn check_prerequisites(&self, platform: &PlatformInfo) -> Result<(), ProbeError> {
        let _ = platform;
        Ok(())
    }
}

/// Executables the runtime installer for `kind` shells out to.
pub fn required_tools(kind: PlatformKind) -> &'static [&'static str] {
    match kind {
        PlatformKind::Linux => &["sh", "curl", "sudo"],
        PlatformKind::Windows => &["powershell"],
        PlatformKind::MacOS => &["brew"],
        PlatformKind::Unknown => &[],
    }
}

/// Reject a platform release outside `supported`.
///
/// An empty list accepts every release. A release is accepted when it equals
/// an entry or starts with an entry followed by a dot (`22.04` accepts
/// `22.04.3`).
pub fn check_supported_version(
    platform: &PlatformInfo,
    supported: &[String],
) -> Result<(), ProbeError> {
    if supported.is_empty() {
        return Ok(());
    }

    let found = platform.version.as_deref().unwrap_or("unknown");
    let accepted = supported.iter().any(|entry| {
        found == entry
            || found
                .strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    });
    if accepted {
        Ok(())
    } else {
        Err(ProbeError::UnsupportedVersion {
            platform: platform.kind.display_name().to_string(),
            found: found.to_string(),
            supported: supported.join(", "),
        })
    }
}
