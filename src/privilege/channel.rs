//! Correlated request/response handshake for elevation credentials.

use super::{ChannelError, PrivilegeRequest, RequestId, Secret};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::oneshot;
use tracing::debug;

/// How a request left the outstanding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Answered,
    Abandoned,
}

struct Outstanding {
    request: PrivilegeRequest,
    responder: oneshot::Sender<Secret>,
}

#[derive(Default)]
struct ChannelState {
    outstanding: Option<Outstanding>,
    history: HashMap<RequestId, (PrivilegeRequest, Resolution)>,
}

impl ChannelState {
    fn resolve(&mut self, mut request: PrivilegeRequest, resolution: Resolution) {
        request.resolved = true;
        self.history.insert(request.id, (request, resolution));
    }
}

/// Rendezvous point for elevation credentials.
///
/// Cheap to clone; clones share the same outstanding request.
#[derive(Clone, Default)]
pub struct PrivilegeChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl PrivilegeChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new credential request.
    ///
    /// Fails with [`ChannelError::AlreadyPending`] while another request is
    /// outstanding. Dropping the returned [`PendingCredential`] before an
    /// answer arrives resolves the request without a credential.
    pub fn request_credential(&self) -> Result<PendingCredential, ChannelError> {
        let mut state = self.lock();
        if let Some(current) = &state.outstanding {
            return Err(ChannelError::AlreadyPending {
                id: current.request.id,
            });
        }

        let request = PrivilegeRequest {
            id: RequestId::new(),
            created_at: SystemTime::now(),
            resolved: false,
        };
        let (responder, receiver) = oneshot::channel();
        state.outstanding = Some(Outstanding {
            request: request.clone(),
            responder,
        });
        debug!(request_id = %request.id, "credential requested");

        Ok(PendingCredential {
            request,
            receiver: Some(receiver),
            channel: self.clone(),
        })
    }

    /// Answer the outstanding request.
    ///
    /// Fails with [`ChannelError::UnknownOrStaleRequest`] when `id` is not
    /// the outstanding request (never issued, superseded, cancelled or timed
    /// out) and with [`ChannelError::AlreadyResolved`] when `id` was already
    /// answered. A rejected submission changes nothing.
    pub fn submit_credential(&self, id: RequestId, secret: Secret) -> Result<(), ChannelError> {
        let mut state = self.lock();

        let matches = state
            .outstanding
            .as_ref()
            .is_some_and(|current| current.request.id == id);
        if !matches {
            return Err(match state.history.get(&id) {
                Some((_, Resolution::Answered)) => ChannelError::AlreadyResolved { id },
                _ => ChannelError::UnknownOrStaleRequest { id },
            });
        }

        let Some(current) = state.outstanding.take() else {
            return Err(ChannelError::UnknownOrStaleRequest { id });
        };
        if current.responder.send(secret).is_err() {
            state.resolve(current.request, Resolution::Abandoned);
            return Err(ChannelError::UnknownOrStaleRequest { id });
        }
        state.resolve(current.request, Resolution::Answered);
        debug!(request_id = %id, "credential submitted");
        Ok(())
    }

    /// The outstanding request, if any.
    pub fn outstanding(&self) -> Option<PrivilegeRequest> {
        self.lock().outstanding.as_ref().map(|o| o.request.clone())
    }

    /// Look up a request by id, outstanding or resolved.
    pub fn request(&self, id: RequestId) -> Option<PrivilegeRequest> {
        let state = self.lock();
        match &state.outstanding {
            Some(current) if current.request.id == id => Some(current.request.clone()),
            _ => state.history.get(&id).map(|(request, _)| request.clone()),
        }
    }

    /// Withdraw the outstanding request, if any.
    ///
    /// The waiter receives [`ChannelError::Cancelled`]; a late
    /// submission for the withdrawn id fails with
    /// [`ChannelError::UnknownOrStaleRequest`].
    pub fn cancel_outstanding(&self) -> Option<RequestId> {
        let mut state = self.lock();
        let current = state.outstanding.take()?;
        let id = current.request.id;
        state.resolve(current.request, Resolution::Abandoned);
        debug!(request_id = %id, "credential request cancelled");
        Some(id)
    }

    fn abandon(&self, id: RequestId) {
        let mut state = self.lock();
        let is_current = state
            .outstanding
            .as_ref()
            .is_some_and(|current| current.request.id == id);
        if is_current {
            if let Some(current) = state.outstanding.take() {
                state.resolve(current.request, Resolution::Abandoned);
            }
            debug!(request_id = %id, "credential request abandoned");
        }
    }
}

/// Waiting side of a credential request.
///
/// Dropping it (timeout, cancelled setup) resolves the request without a
/// credential, so no waiter is ever leaked.
pub struct PendingCredential {
    request: PrivilegeRequest,
    receiver: Option<oneshot::Receiver<Secret>>,
    channel: PrivilegeChannel,
}

impl PendingCredential {
    /// The request being waited on.
    pub fn request(&self) -> &PrivilegeRequest {
        &self.request
    }

    /// Suspend until the operator answers or the request is cancelled.
    pub async fn wait(mut self) -> Result<Secret, ChannelError> {
        let id = self.request.id;
        let receiver = self
            .receiver
            .take()
            .ok_or(ChannelError::Cancelled { id })?;
        receiver.await.map_err(|_| ChannelError::Cancelled { id })
    }
}

impl Drop for PendingCredential {
    fn drop(&mut self) {
        self.channel.abandon(self.request.id);
    }
}

impl std::fmt::Debug for PendingCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCredential")
            .field("request", &self.request)
            .finish()
    }
}
