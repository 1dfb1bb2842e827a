//! Privilege elevation channel.
//!
//! A rendezvous between the orchestrator, which needs an elevation
//! credential, and the operator who supplies it. At most one request is
//! outstanding at a time. Responses are correlated by [`RequestId`], so an
//! answer to a superseded or cancelled prompt can never unlock a newer one.
//!
//! # Example
//!
//! ```rust
//! use runtime_bootstrap::{PrivilegeChannel, Secret};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let channel = PrivilegeChannel::new();
//!     let pending = channel.request_credential().unwrap();
//!     let id = pending.request().id;
//!
//!     channel.submit_credential(id, Secret::new("correct horse")).unwrap();
//!     let secret = pending.wait().await.unwrap();
//!     assert_eq!(secret.expose(), "correct horse");
//! }
//! ```

mod channel;
mod errors;

pub use channel::{PendingCredential, PrivilegeChannel};
pub use errors::ChannelError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Opaque unique token correlating a credential request with its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A credential request issued to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeRequest {
    /// Correlation token.
    pub id: RequestId,
    /// When the request was issued.
    pub created_at: SystemTime,
    /// Whether it has been answered, cancelled or timed out.
    pub resolved: bool,
}

/// An elevation credential.
///
/// Never printed: `Debug` shows a redaction marker, and there is no
/// `Display`, `Clone` or `Serialize`.
pub struct Secret(String);

impl Secret {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for handing to the process that needs it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}
