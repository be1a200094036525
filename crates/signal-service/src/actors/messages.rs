//! Message types for actor communication.
//!
//! Request/response messages carry a `oneshot::Sender`; fire-and-forget
//! messages do not.

use crate::collaborators::StoredMessage;
use crate::errors::SignalError;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::relay::FanOut;
use common::types::{ConnectionId, Identity};
use tokio::sync::{mpsc, oneshot};

/// How a new connection is bound when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    /// Identity bound at connect time, if any.
    pub identity: Option<Identity>,
    /// Whether `identity` came from a verified credential.
    pub authenticated: bool,
}

impl ConnectionBinding {
    /// Identity proven by a credential.
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            authenticated: true,
        }
    }

    /// Identity claimed via `?userId=` in anonymous mode.
    pub fn claimed(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            authenticated: false,
        }
    }

    /// No identity yet; the client must `register` first.
    pub fn unbound() -> Self {
        Self {
            identity: None,
            authenticated: false,
        }
    }
}

/// Messages sent to the `SignalingHubActor`.
#[derive(Debug)]
pub enum HubMessage {
    /// A transport connection opened. The hub spawns its connection actor,
    /// which writes encoded frames to `outbound`.
    OpenConnection {
        binding: ConnectionBinding,
        outbound: mpsc::Sender<String>,
        respond_to: oneshot::Sender<Result<ConnectionId, SignalError>>,
    },

    /// A decoded event from a connection's reader task.
    ClientEvent {
        connection_id: ConnectionId,
        event: ClientEvent,
    },

    /// A frame that failed to decode; answered with an `error` event.
    MalformedFrame {
        connection_id: ConnectionId,
        error: SignalError,
    },

    /// Transport connection closed.
    Disconnect { connection_id: ConnectionId },

    /// Fan out a persisted chat message to its recipient.
    DeliverMessage {
        message: StoredMessage,
        respond_to: oneshot::Sender<FanOut>,
    },

    /// Current online set.
    OnlineIdentities {
        respond_to: oneshot::Sender<Vec<Identity>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<HubStatus>,
    },

    /// Close every connection and disarm every timer.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), SignalError>>,
    },
}

/// Snapshot of hub state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStatus {
    /// Open transport connections, bound or not.
    pub open_connections: usize,
    /// Connections registered under an identity.
    pub registered_connections: usize,
    pub online_identities: usize,
    pub active_calls: usize,
    pub accepting_new: bool,
    /// Messages queued when the status request was taken, itself included.
    pub mailbox_depth: usize,
    /// Deepest the mailbox has been since start.
    pub peak_mailbox_depth: usize,
}

/// Messages sent to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Encode and write a server event.
    Send { event: ServerEvent },

    /// Close the connection.
    Close { reason: String },
}
