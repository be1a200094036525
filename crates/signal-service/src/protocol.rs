//! Wire protocol for the `/socket` endpoint.
//!
//! Every WebSocket text frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! Payload-less events omit `data`. SDP offers, answers and ICE candidates are
//! opaque JSON values relayed without inspection.

use crate::collaborators::StoredMessage;
use crate::errors::SignalError;
use common::types::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Late-bind (or confirm) the connection's identity.
    Register(Identity),

    /// Start a call to `to` with an SDP offer.
    CallUser { to: Identity, offer: Value },

    /// Accept a ringing call from `to` with an SDP answer.
    AnswerCall { to: Identity, answer: Value },

    /// Relay an ICE candidate to `to`.
    IceCandidate { to: Identity, candidate: Value },

    /// Decline a ringing call from `to`.
    RejectCall { to: Identity },

    /// Cancel, decline or hang up the call with `to`.
    EndCall { to: Identity },
}

impl ClientEvent {
    /// Decode and validate one inbound text frame.
    ///
    /// Unknown events, missing fields, blank identities and `null` SDP
    /// payloads are all reported as `MalformedEvent`.
    pub fn decode(frame: &str) -> Result<Self, SignalError> {
        let event: ClientEvent = serde_json::from_str(frame)
            .map_err(|e| SignalError::MalformedEvent(format!("Invalid event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), SignalError> {
        match self {
            ClientEvent::Register(identity) if identity.is_blank() => Err(
                SignalError::MalformedEvent("register requires a non-empty identity".to_string()),
            ),
            ClientEvent::CallUser { offer: payload, .. }
            | ClientEvent::AnswerCall { answer: payload, .. }
            | ClientEvent::IceCandidate {
                candidate: payload,
                ..
            } if payload.is_null() => Err(SignalError::MalformedEvent(format!(
                "{} requires a payload",
                self.name()
            ))),
            _ => match self.target() {
                Some(to) if to.is_blank() => Err(SignalError::MalformedEvent(format!(
                    "{} requires a non-empty target",
                    self.name()
                ))),
                _ => Ok(()),
            },
        }
    }

    /// Destination identity, for events that carry one.
    pub fn target(&self) -> Option<&Identity> {
        match self {
            ClientEvent::Register(_) => None,
            ClientEvent::CallUser { to, .. }
            | ClientEvent::AnswerCall { to, .. }
            | ClientEvent::IceCandidate { to, .. }
            | ClientEvent::RejectCall { to }
            | ClientEvent::EndCall { to } => Some(to),
        }
    }

    /// Wire name, used as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Register(_) => "register",
            ClientEvent::CallUser { .. } => "call-user",
            ClientEvent::AnswerCall { .. } => "answer-call",
            ClientEvent::IceCandidate { .. } => "ice-candidate",
            ClientEvent::RejectCall { .. } => "reject-call",
            ClientEvent::EndCall { .. } => "end-call",
        }
    }
}

/// Event pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full set of online identities.
    #[serde(rename = "getOnlineUsers")]
    GetOnlineUsers(Vec<Identity>),

    /// A call offer from `from`.
    IncomingCall { from: Identity, offer: Value },

    /// The receiver accepted; carries the SDP answer.
    CallAnswered { answer: Value },

    /// ICE candidate from the peer.
    IceCandidate { candidate: Value },

    /// The receiver declined, or the offer was refused.
    CallRejected,

    /// The call is over.
    CallEnded,

    /// A newly persisted chat message.
    #[serde(rename = "newMessage")]
    NewMessage(StoredMessage),

    /// An inbound event was rejected.
    Error { code: i32, message: String },
}

impl ServerEvent {
    /// Build the `error` event for a rejected inbound event.
    pub fn from_error(err: &SignalError) -> Self {
        ServerEvent::Error {
            code: err.error_code(),
            message: err.client_message(),
        }
    }

    /// Encode as one WebSocket text frame.
    pub fn encode(&self) -> Result<String, SignalError> {
        serde_json::to_string(self)
            .map_err(|e| SignalError::Internal(format!("Failed to encode event: {e}")))
    }

    /// Wire name, used as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::GetOnlineUsers(_) => "getOnlineUsers",
            ServerEvent::IncomingCall { .. } => "incoming-call",
            ServerEvent::CallAnswered { .. } => "call-answered",
            ServerEvent::IceCandidate { .. } => "ice-candidate",
            ServerEvent::CallRejected => "call-rejected",
            ServerEvent::CallEnded => "call-ended",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::Error { .. } => "error",
        }
    }
}
