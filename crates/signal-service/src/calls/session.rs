//! Per-call state.

use chrono::{DateTime, Utc};
use common::types::{CallId, Identity};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Receiver candidates held while the caller has no remote description yet.
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Lifecycle of one call. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Connected,
    Ended,
}

/// How one party sees a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyPhase {
    Idle,
    RingingOut,
    RingingIn,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Receiver,
}

/// The one outstanding ring timer of a call.
///
/// `epoch` lets the coordinator recognise a fire from a timer that was
/// disarmed after it had already posted its expiry.
#[derive(Debug)]
pub struct CallTimer {
    pub cancel: CancellationToken,
    pub epoch: u64,
}

/// One call negotiation between two identities.
#[derive(Debug)]
pub struct CallSession {
    pub id: CallId,
    pub caller: Identity,
    pub receiver: Identity,
    pub state: CallState,
    /// End of the ringing phase while a timer is armed.
    pub deadline: Option<Instant>,
    pub created_at: DateTime<Utc>,
    pending_candidates: Vec<Value>,
    timer: Option<CallTimer>,
}

impl CallSession {
    /// New session in `Ringing`.
    pub fn new(caller: Identity, receiver: Identity) -> Self {
        Self {
            id: CallId::new(),
            caller,
            receiver,
            state: CallState::Ringing,
            deadline: None,
            created_at: Utc::now(),
            pending_candidates: Vec::new(),
            timer: None,
        }
    }

    pub fn role_of(&self, identity: &Identity) -> Option<CallRole> {
        if identity == &self.caller {
            Some(CallRole::Caller)
        } else if identity == &self.receiver {
            Some(CallRole::Receiver)
        } else {
            None
        }
    }

    /// The other party, if `identity` takes part in this call.
    pub fn peer_of(&self, identity: &Identity) -> Option<&Identity> {
        match self.role_of(identity)? {
            CallRole::Caller => Some(&self.receiver),
            CallRole::Receiver => Some(&self.caller),
        }
    }

    pub fn phase_for(&self, identity: &Identity) -> PartyPhase {
        match (self.state, self.role_of(identity)) {
            (CallState::Ringing, Some(CallRole::Caller)) => PartyPhase::RingingOut,
            (CallState::Ringing, Some(CallRole::Receiver)) => PartyPhase::RingingIn,
            (CallState::Connected, Some(_)) => PartyPhase::Connected,
            _ => PartyPhase::Idle,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.state == CallState::Ringing
    }

    /// Install the ring timer, replacing (and cancelling) any previous one.
    pub fn arm(&mut self, timer: CallTimer, deadline: Instant) {
        self.disarm();
        self.timer = Some(timer);
        self.deadline = Some(deadline);
    }

    /// Cancel the ring timer. Safe to call repeatedly.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
        }
        self.deadline = None;
    }

    /// Epoch of the armed timer, if any.
    pub fn timer_epoch(&self) -> Option<u64> {
        self.timer.as_ref().map(|t| t.epoch)
    }

    /// Hold a candidate for the caller.
    ///
    /// Returns `false` when the buffer is full and the candidate was dropped.
    pub fn buffer_candidate(&mut self, candidate: Value) -> bool {
        if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
            return false;
        }
        self.pending_candidates.push(candidate);
        true
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Drain buffered candidates in arrival order.
    pub fn take_pending_candidates(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.pending_candidates)
    }

    /// Move to `Connected` and stop the ring timer.
    pub fn connect(&mut self) {
        self.disarm();
        self.state = CallState::Connected;
    }

    /// Move to `Ended`, stop the timer and drop anything buffered.
    pub fn end(&mut self) {
        self.disarm();
        self.pending_candidates.clear();
        self.state = CallState::Ended;
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.disarm();
    }
}
