//! Error types for capability probing.

use thiserror::Error;

/// A host fact could not be determined.
///
/// Probe failures are never defaulted to "absent" or "unsupported"; they
/// surface as a failed stage the operator can retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// A query command could not be run or gave no usable answer.
    #[error("could not query {query}: {message}")]
    QueryFailed {
        /// What was being asked (e.g. "OS release").
        query: String,
        /// What went wrong.
        message: String,
    },

    /// A tool setup relies on is not installed.
    #[error("required tool {tool} not found")]
    MissingPrerequisite {
        /// Executable name.
        tool: String,
    },

    /// The OS release is outside the supported list.
    #[error("unsupported {platform} version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Platform display name.
        platform: String,
        /// Release reported by the host.
        found: String,
        /// Comma-separated supported releases.
        supported: String,
    },
}

impl ProbeError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::QueryFailed { .. } => "Check that standard system tools are available, then retry",
            Self::MissingPrerequisite { .. } => "Install the missing tool with the system package manager, then retry",
            Self::UnsupportedVersion { .. } => "Upgrade to a supported OS release",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_prerequisite_display() {
        let err = ProbeError::MissingPrerequisite {
            tool: "curl".to_string(),
        };
        assert_eq!(err.to_string(), "required tool curl not found");
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = ProbeError::UnsupportedVersion {
            platform: "Linux".to_string(),
            found: "18.04".to_string(),
            supported: "20.04, 22.04, 24.04".to_string(),
        };
        assert!(err.to_string().contains("18.04"));
        assert!(err.to_string().contains("22.04"));
        assert!(err.fix_suggestion().contains("Upgrade"));
    }
}
