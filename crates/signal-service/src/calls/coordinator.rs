//! Call negotiation state machine.
//!
//! The coordinator owns every in-flight `CallSession` and its ring timer. It
//! never holds connection handles: each operation receives the registry and
//! resolves destinations at the moment it relays.
//!
//! | From | Event | To | Relay |
//! |------|-------|----|-------|
//! | idle | offer | ringing | `incoming-call` to receiver, arm timer |
//! | ringing | answer (receiver) | connected | `call-answered` + buffered candidates to caller |
//! | ringing | reject (receiver) | ended | `call-rejected` to caller |
//! | ringing | end-call (either) | ended | `call-ended` to the other party |
//! | ringing | timer fires | ended | `call-ended` to receiver |
//! | connected | end-call (either) | ended | `call-ended` to the other party |
//! | any | ice-candidate | unchanged | `ice-candidate` to target, or buffered |
//!
//! Ended sessions are removed immediately.

use super::session::{CallRole, CallSession, CallTimer, PartyPhase};
use crate::errors::SignalError;
use crate::observability::metrics;
use crate::protocol::ServerEvent;
use crate::registry::{ConnectionRegistry, EventSink};
use crate::relay::fan_out;
use common::types::{CallId, Identity};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Posted by a ring timer when its deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpired {
    pub call_id: CallId,
    pub epoch: u64,
}

/// Unordered pair of identities; at most one in-flight call per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey(Identity, Identity);

impl PairKey {
    fn new(a: &Identity, b: &Identity) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }
}

/// Owns call sessions and their ring timers.
pub struct CallCoordinator {
    sessions: HashMap<CallId, CallSession>,
    by_pair: HashMap<PairKey, CallId>,
    by_identity: HashMap<Identity, HashSet<CallId>>,
    ring_timeout: Duration,
    /// Refuse offers when either party already has a non-ended call.
    exclusive: bool,
    next_epoch: u64,
    timeouts: mpsc::UnboundedSender<TimerExpired>,
    /// Parent of every ring timer's token.
    timers_root: CancellationToken,
}

impl CallCoordinator {
    /// Create a coordinator and the receiver its ring timers post to.
    ///
    /// The owner must feed every received `TimerExpired` back into
    /// [`CallCoordinator::handle_timeout`].
    pub fn new(
        ring_timeout: Duration,
        exclusive: bool,
    ) -> (Self, mpsc::UnboundedReceiver<TimerExpired>) {
        let (timeouts, timeout_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: HashMap::new(),
                by_pair: HashMap::new(),
                by_identity: HashMap::new(),
                ring_timeout,
                exclusive,
                next_epoch: 0,
                timeouts,
                timers_root: CancellationToken::new(),
            },
            timeout_rx,
        )
    }

    /// Number of non-ended sessions.
    pub fn active_calls(&self) -> usize {
        self.sessions.len()
    }

    /// How `identity` currently sees its call with `peer`.
    pub fn phase_between(&self, identity: &Identity, peer: &Identity) -> PartyPhase {
        self.by_pair
            .get(&PairKey::new(identity, peer))
            .and_then(|id| self.sessions.get(id))
            .map_or(PartyPhase::Idle, |s| s.phase_for(identity))
    }

    /// Whether `identity` takes part in any non-ended call.
    pub fn is_busy(&self, identity: &Identity) -> bool {
        self.by_identity
            .get(identity)
            .is_some_and(|calls| !calls.is_empty())
    }

    /// Caller offers a call to `target`.
    ///
    /// Self-calls are malformed. An in-flight call for the pair is a
    /// conflict; with exclusivity on, a party already in another call is busy.
    /// An offline receiver still gets a ringing session so the caller's
    /// timeout runs its normal course.
    pub fn offer<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        caller: &Identity,
        target: &Identity,
        offer: Value,
    ) -> Result<CallId, SignalError> {
        if caller == target {
            return Err(SignalError::MalformedEvent(
                "call-user cannot target yourself".to_string(),
            ));
        }

        if self.by_pair.contains_key(&PairKey::new(caller, target)) {
            metrics::record_call_outcome("refused");
            return Err(SignalError::CallConflict(format!(
                "{caller} and {target} already have a call in progress"
            )));
        }

        if self.exclusive && (self.is_busy(caller) || self.is_busy(target)) {
            metrics::record_call_outcome("refused");
            return Err(SignalError::Busy);
        }

        let mut session = CallSession::new(caller.clone(), target.clone());
        self.arm_timer(&mut session);
        let call_id = session.id;

        self.index(&session);
        self.sessions.insert(call_id, session);
        metrics::set_calls_active(self.sessions.len());

        let outcome = fan_out(
            registry,
            target,
            &ServerEvent::IncomingCall {
                from: caller.clone(),
                offer,
            },
        );

        info!(
            target: "ss.calls",
            call_id = %call_id,
            caller = %caller,
            receiver = %target,
            delivered = outcome.delivered,
            "Call ringing"
        );

        Ok(call_id)
    }

    /// Receiver answers the call from `caller`.
    ///
    /// Returns `NoActiveCall` unless `answerer` is the receiver of a ringing
    /// session with `caller`.
    pub fn answer<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        answerer: &Identity,
        caller: &Identity,
        answer: Value,
    ) -> Result<CallId, SignalError> {
        let session = self
            .ringing_session_mut(answerer, caller, CallRole::Receiver)
            .ok_or(SignalError::NoActiveCall)?;

        session.connect();
        let call_id = session.id;
        let pending = session.take_pending_candidates();

        fan_out(registry, caller, &ServerEvent::CallAnswered { answer });
        for candidate in &pending {
            fan_out(
                registry,
                caller,
                &ServerEvent::IceCandidate {
                    candidate: candidate.clone(),
                },
            );
        }

        metrics::record_call_outcome("answered");
        info!(
            target: "ss.calls",
            call_id = %call_id,
            caller = %caller,
            receiver = %answerer,
            flushed_candidates = pending.len(),
            "Call connected"
        );

        Ok(call_id)
    }

    /// Receiver declines the call from `caller`.
    pub fn reject<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        rejecter: &Identity,
        caller: &Identity,
    ) -> Result<CallId, SignalError> {
        let call_id = self
            .ringing_session_mut(rejecter, caller, CallRole::Receiver)
            .map(|s| s.id)
            .ok_or(SignalError::NoActiveCall)?;

        self.finish(call_id, "rejected");
        fan_out(registry, caller, &ServerEvent::CallRejected);

        info!(
            target: "ss.calls",
            call_id = %call_id,
            caller = %caller,
            receiver = %rejecter,
            "Call rejected"
        );

        Ok(call_id)
    }

    /// Either party ends the call with `peer`.
    ///
    /// Covers caller cancel and receiver decline while ringing, and hang-up
    /// once connected. The other party receives `call-ended`. Without an
    /// in-flight session this is a no-op returning `None`, so repeated ends
    /// produce a single `call-ended`.
    pub fn end<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        ender: &Identity,
        peer: &Identity,
    ) -> Option<CallId> {
        let Some(&call_id) = self.by_pair.get(&PairKey::new(ender, peer)) else {
            debug!(
                target: "ss.calls",
                from = %ender,
                to = %peer,
                "end-call without an in-flight call ignored"
            );
            return None;
        };

        let outcome = match self.sessions.get(&call_id) {
            Some(s) if s.is_ringing() && s.role_of(ender) == Some(CallRole::Caller) => "cancelled",
            Some(s) if s.is_ringing() => "declined",
            _ => "hung_up",
        };

        self.finish(call_id, outcome);
        fan_out(registry, peer, &ServerEvent::CallEnded);

        info!(
            target: "ss.calls",
            call_id = %call_id,
            from = %ender,
            to = %peer,
            outcome,
            "Call ended"
        );

        Some(call_id)
    }

    /// Relay an ICE candidate, buffering receiver candidates while ringing.
    ///
    /// Returns `true` when the candidate was buffered instead of relayed.
    pub fn ice_candidate<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        from: &Identity,
        to: &Identity,
        candidate: Value,
    ) -> bool {
        if let Some(session) = self.ringing_session_mut(from, to, CallRole::Receiver) {
            let call_id = session.id;
            if !session.buffer_candidate(candidate) {
                metrics::record_event_dropped("buffer_full");
                warn!(
                    target: "ss.calls",
                    call_id = %call_id,
                    "Pending candidate buffer full, dropping candidate"
                );
            }
            return true;
        }

        fan_out(registry, to, &ServerEvent::IceCandidate { candidate });
        false
    }

    /// Handle a ring timer expiry.
    ///
    /// Ends a still-ringing call and tells the receiver; the caller runs its
    /// own local timeout. A missing session, a session that is no longer
    /// ringing, or a superseded epoch is a no-op. Returns whether the call
    /// was ended.
    pub fn handle_timeout<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        expired: TimerExpired,
    ) -> bool {
        let receiver = match self.sessions.get(&expired.call_id) {
            Some(s) if s.is_ringing() && s.timer_epoch() == Some(expired.epoch) => {
                s.receiver.clone()
            }
            _ => {
                debug!(
                    target: "ss.calls",
                    call_id = %expired.call_id,
                    epoch = expired.epoch,
                    "Stale ring timer ignored"
                );
                return false;
            }
        };

        self.finish(expired.call_id, "timed_out");
        fan_out(registry, &receiver, &ServerEvent::CallEnded);

        info!(
            target: "ss.calls",
            call_id = %expired.call_id,
            receiver = %receiver,
            "Call timed out"
        );

        true
    }

    /// End every call `identity` takes part in after its last connection
    /// closed, telling each peer.
    pub fn identity_offline<H: EventSink>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        identity: &Identity,
    ) -> usize {
        let call_ids: Vec<CallId> = self
            .by_identity
            .get(identity)
            .map(|calls| calls.iter().copied().collect())
            .unwrap_or_default();

        for call_id in &call_ids {
            let peer = self
                .sessions
                .get(call_id)
                .and_then(|s| s.peer_of(identity))
                .cloned();

            self.finish(*call_id, "disconnected");

            if let Some(peer) = peer {
                fan_out(registry, &peer, &ServerEvent::CallEnded);
                info!(
                    target: "ss.calls",
                    call_id = %call_id,
                    offline = %identity,
                    peer = %peer,
                    "Call ended by disconnect"
                );
            }
        }

        call_ids.len()
    }

    /// Disarm every timer and drop every session.
    pub fn shutdown(&mut self) {
        self.timers_root.cancel();
        for session in self.sessions.values_mut() {
            session.end();
        }
        self.sessions.clear();
        self.by_pair.clear();
        self.by_identity.clear();
        metrics::set_calls_active(0);
    }

    fn ringing_session_mut(
        &mut self,
        actor: &Identity,
        peer: &Identity,
        role: CallRole,
    ) -> Option<&mut CallSession> {
        let call_id = self.by_pair.get(&PairKey::new(actor, peer))?;
        self.sessions
            .get_mut(call_id)
            .filter(|s| s.is_ringing() && s.role_of(actor) == Some(role))
    }

    fn arm_timer(&mut self, session: &mut CallSession) {
        self.next_epoch += 1;
        let expired = TimerExpired {
            call_id: session.id,
            epoch: self.next_epoch,
        };

        let cancel = self.timers_root.child_token();
        let timer_cancel = cancel.clone();
        let timeouts = self.timeouts.clone();
        let ring_timeout = self.ring_timeout;

        tokio::spawn(async move {
            tokio::select! {
                () = timer_cancel.cancelled() => {}
                () = tokio::time::sleep(ring_timeout) => {
                    // Receiver gone means the coordinator is gone too.
                    let _ = timeouts.send(expired);
                }
            }
        });

        session.arm(
            CallTimer {
                cancel,
                epoch: expired.epoch,
            },
            Instant::now() + ring_timeout,
        );
    }

    fn index(&mut self, session: &CallSession) {
        self.by_pair.insert(
            PairKey::new(&session.caller, &session.receiver),
            session.id,
        );
        for party in [&session.caller, &session.receiver] {
            self.by_identity
                .entry(party.clone())
                .or_default()
                .insert(session.id);
        }
    }

    /// End and remove a session.
    fn finish(&mut self, call_id: CallId, outcome: &str) {
        let Some(mut session) = self.sessions.remove(&call_id) else {
            return;
        };
        session.end();

        self.by_pair
            .remove(&PairKey::new(&session.caller, &session.receiver));
        for party in [&session.caller, &session.receiver] {
            if let Some(calls) = self.by_identity.get_mut(party) {
                calls.remove(&call_id);
                if calls.is_empty() {
                    self.by_identity.remove(party);
                }
            }
        }

        metrics::record_call_outcome(outcome);
        metrics::set_calls_active(self.sessions.len());
    }
}
