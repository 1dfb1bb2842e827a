//! Error types for the privilege elevation channel.

use super::RequestId;
use thiserror::Error;

/// Errors returned by [`PrivilegeChannel`](super::PrivilegeChannel).
///
/// None of these change the setup session; a rejected submission leaves
/// the outstanding request (if any) untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// A credential request is already outstanding.
    #[error("credential request {id} is already pending")]
    AlreadyPending {
        /// The request that is still outstanding.
        id: RequestId,
    },

    /// The id does not name the outstanding request.
    ///
    /// Returned for ids that were never issued and for requests that were
    /// superseded, cancelled or timed out.
    #[error("credential request {id} is unknown or no longer pending")]
    UnknownOrStaleRequest {
        /// The id that was submitted.
        id: RequestId,
    },

    /// A credential was already accepted for this request.
    #[error("credential request {id} was already answered")]
    AlreadyResolved {
        /// The id that was submitted twice.
        id: RequestId,
    },

    /// The request was withdrawn before a credential arrived.
    #[error("credential request {id} was cancelled")]
    Cancelled {
        /// The withdrawn request.
        id: RequestId,
    },
}

impl ChannelError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::AlreadyPending { .. } => "Answer the pending password prompt first",
            Self::UnknownOrStaleRequest { .. } => {
                "The prompt expired; answer the most recent password prompt"
            }
            Self::AlreadyResolved { .. } => "The password was already accepted; nothing to do",
            Self::Cancelled { .. } => "Retry the setup to get a new password prompt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_id() {
        let id = RequestId::new();
        let err = ChannelError::UnknownOrStaleRequest { id };
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_all_variants_have_fix() {
        let id = RequestId::new();
        let errors = vec![
            ChannelError::AlreadyPending { id },
            ChannelError::UnknownOrStaleRequest { id },
            ChannelError::AlreadyResolved { id },
            ChannelError::Cancelled { id },
        ];
        for error in errors {
            assert!(!error.fix_suggestion().is_empty(), "{:?}", error);
        }
    }
}
