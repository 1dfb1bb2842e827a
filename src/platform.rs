//! Host platform identification and the capability flags derived from it.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// The family of operating system the application runs on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter,
)]
#[non_exhaustive]
pub enum PlatformKind {
    /// Linux (the install path targets Debian/Ubuntu).
    Linux,
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOS,
    /// Anything else; setup cannot install a runtime here.
    Unknown,
}

impl PlatformKind {
    /// Platform of the running process.
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name to a platform kind.
    pub fn from_os_name(os: &str) -> Self {
        match os {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            "macos" => Self::MacOS,
            _ => Self::Unknown,
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::MacOS => "macOS",
            Self::Unknown => "Unknown",
        }
    }

    /// Iterator over all known platform kinds.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }
}

/// Result of [`CapabilityProbe::detect_os`](crate::CapabilityProbe::detect_os).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Operating system family.
    pub kind: PlatformKind,

    /// Release string reported by the host (e.g. `22.04`, `10.0.22631`).
    ///
    /// `None` when the host answered but reported nothing usable.
    pub version: Option<String>,

    /// CPU architecture (`std::env::consts::ARCH`).
    pub arch: String,
}

impl PlatformInfo {
    /// Capability flags for this platform.
    pub fn profile(&self) -> PlatformProfile {
        PlatformProfile::for_kind(self.kind)
    }
}

/// Capability flags that parameterize the state machine.
///
/// Resolved once per session from the detected platform, so the transition
/// table is shared by every platform instead of being duplicated per OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    /// The platform these flags were derived from.
    pub kind: PlatformKind,

    /// Privileged commands need an operator-typed credential (sudo).
    pub requires_interactive_elevation: bool,

    /// Setup pauses at `AwaitingStart` until the operator confirms.
    pub requires_start_confirmation: bool,
}

impl PlatformProfile {
    /// Flags for a platform kind.
    ///
    /// ```rust
    /// use runtime_bootstrap::{PlatformKind, PlatformProfile};
    ///
    /// let linux = PlatformProfile::for_kind(PlatformKind::Linux);
    /// assert!(linux.requires_interactive_elevation);
    /// assert!(!linux.requires_start_confirmation);
    /// ```
    pub fn for_kind(kind: PlatformKind) -> Self {
        match kind {
            PlatformKind::Linux => Self {
                kind,
                requires_interactive_elevation: true,
                requires_start_confirmation: false,
            },
            // The installer raises its own UAC prompt, so the operator
            // confirms up front instead of typing a credential.
            PlatformKind::Windows => Self {
                kind,
                requires_interactive_elevation: false,
                requires_start_confirmation: true,
            },
            PlatformKind::MacOS | PlatformKind::Unknown => Self {
                kind,
                requires_interactive_elevation: false,
                requires_start_confirmation: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os_name() {
        assert_eq!(PlatformKind::from_os_name("linux"), PlatformKind::Linux);
        assert_eq!(PlatformKind::from_os_name("windows"), PlatformKind::Windows);
        assert_eq!(PlatformKind::from_os_name("macos"), PlatformKind::MacOS);
        assert_eq!(PlatformKind::from_os_name("freebsd"), PlatformKind::Unknown);
    }

    #[test]
    fn test_current_matches_consts() {
        assert_eq!(
            PlatformKind::current(),
            PlatformKind::from_os_name(std::env::consts::OS)
        );
    }

    #[test]
    fn test_profiles() {
        let windows = PlatformProfile::for_kind(PlatformKind::Windows);
        assert!(!windows.requires_interactive_elevation);
        assert!(windows.requires_start_confirmation);

        let mac = PlatformProfile::for_kind(PlatformKind::MacOS);
        assert!(!mac.requires_interactive_elevation);
        assert!(!mac.requires_start_confirmation);
    }

    #[test]
    fn test_no_platform_needs_both_flags() {
        for kind in PlatformKind::all() {
            let p = PlatformProfile::for_kind(kind);
            assert!(!(p.requires_interactive_elevation && p.requires_start_confirmation));
        }
    }

    #[test]
    fn test_info_profile() {
        let info = PlatformInfo {
            kind: PlatformKind::Linux,
            version: Some("22.04".to_string()),
            arch: "x86_64".to_string(),
        };
        assert_eq!(info.profile().kind, PlatformKind::Linux);
    }
}
