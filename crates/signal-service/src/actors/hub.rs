//! `SignalingHubActor` - singleton owner of presence and call state.
//!
//! The hub is the only task that touches the connection registry and the
//! call coordinator. Every transport event, timer expiry and HTTP fan-out
//! request arrives through its mailbox and is processed to completion
//! (registry mutation, presence broadcast and relays) before the next one
//! starts. This gives the single-threaded dispatch model on a
//! multi-threaded runtime without any locking.
//!
//! The hub also:
//! - Spawns one `ConnectionActor` per transport connection
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors connection actors for panics via their `JoinHandle`
//!
//! # Graceful Shutdown
//!
//! On shutdown the hub stops accepting connections, closes every connection
//! actor and disarms every ring timer.

use crate::calls::{CallCoordinator, TimerExpired};
use crate::collaborators::StoredMessage;
use crate::config::Config;
use crate::errors::SignalError;
use crate::observability::metrics;
use crate::presence;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::{ConnectionRegistry, RegistryChange};
use crate::relay::{self, deliver_to, FanOut};

use super::connection::{ConnectionActor, ConnectionActorHandle};
use super::messages::{ConnectionBinding, HubMessage, HubStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{ConnectionId, Identity};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the hub mailbox.
const HUB_CHANNEL_BUFFER: usize = 4096;

/// How often finished connection tasks are reaped.
const CONNECTION_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Hub behaviour knobs, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub ring_timeout: Duration,
    pub exclusive_calls: bool,
    pub allow_anonymous_identity: bool,
    pub connection_buffer: usize,
}

impl HubSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ring_timeout: config.call_ring_timeout,
            exclusive_calls: config.exclusive_calls,
            allow_anonymous_identity: config.allow_anonymous_identity,
            connection_buffer: config.connection_buffer,
        }
    }
}

/// Handle to the `SignalingHubActor`.
///
/// This is the public interface used by the transport and the HTTP handlers.
#[derive(Clone, Debug)]
pub struct SignalingHubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
}

impl SignalingHubHandle {
    /// Spawn the hub actor and return a handle to it.
    #[must_use]
    pub fn new(settings: HubSettings, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SignalingHubActor::new(settings, receiver, cancel_token.clone(), metrics);
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Open a connection whose encoded frames go to `outbound`.
    ///
    /// A bound connection is registered (and presence announced) before this
    /// returns.
    pub async fn open_connection(
        &self,
        binding: ConnectionBinding,
        outbound: mpsc::Sender<String>,
    ) -> Result<ConnectionId, SignalError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::OpenConnection {
                binding,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))?
    }

    /// Forward a decoded client event.
    pub async fn client_event(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalError> {
        self.sender
            .send(HubMessage::ClientEvent {
                connection_id,
                event,
            })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))
    }

    /// Report a frame that failed to decode.
    pub async fn malformed_frame(
        &self,
        connection_id: ConnectionId,
        error: SignalError,
    ) -> Result<(), SignalError> {
        self.sender
            .send(HubMessage::MalformedFrame {
                connection_id,
                error,
            })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))
    }

    /// Transport connection closed.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), SignalError> {
        self.sender
            .send(HubMessage::Disconnect { connection_id })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))
    }

    /// Push a persisted message to every connection of its recipient.
    pub async fn deliver_message(&self, message: StoredMessage) -> Result<FanOut, SignalError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::DeliverMessage {
                message,
                respond_to: tx,
            })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))
    }

    /// Current online set, sorted.
    pub async fn online_identities(&self) -> Result<Vec<Identity>, SignalError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::OnlineIdentities { respond_to: tx })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn get_status(&self) -> Result<HubStatus, SignalError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown and wait for it to finish.
    pub async fn shutdown(&self) -> Result<(), SignalError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A connection the hub has spawned an actor for.
struct ManagedConnection {
    handle: ConnectionActorHandle,
    task_handle: JoinHandle<()>,
    binding: ConnectionBinding,
}

/// The `SignalingHubActor` implementation.
pub struct SignalingHubActor {
    settings: HubSettings,
    receiver: mpsc::Receiver<HubMessage>,
    /// Root token; connection actors get children.
    cancel_token: CancellationToken,
    /// Every open connection, registered or not.
    connections: HashMap<ConnectionId, ManagedConnection>,
    registry: ConnectionRegistry<ConnectionActorHandle>,
    coordinator: CallCoordinator,
    /// Ring timer expiries posted by the coordinator's timers.
    timeouts: mpsc::UnboundedReceiver<TimerExpired>,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl SignalingHubActor {
    fn new(
        settings: HubSettings,
        receiver: mpsc::Receiver<HubMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (coordinator, timeouts) =
            CallCoordinator::new(settings.ring_timeout, settings.exclusive_calls);

        Self {
            settings,
            receiver,
            cancel_token,
            connections: HashMap::new(),
            registry: ConnectionRegistry::new(),
            coordinator,
            timeouts,
            accepting_new: true,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Hub, "hub"),
        }
    }

    #[instrument(skip_all, name = "ss.actor.hub")]
    async fn run(mut self) {
        info!(
            target: "ss.actor.hub",
            ring_timeout_secs = self.settings.ring_timeout.as_secs(),
            exclusive_calls = self.settings.exclusive_calls,
            allow_anonymous_identity = self.settings.allow_anonymous_identity,
            "SignalingHubActor started"
        );

        let mut health_check = tokio::time::interval(CONNECTION_HEALTH_INTERVAL);
        health_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "ss.actor.hub",
                        "SignalingHubActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_received(self.receiver.len());
                            let should_exit = self.handle_message(message);
                            if self.receiver.is_empty() {
                                self.mailbox.record_idle();
                            }

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "ss.actor.hub",
                                "SignalingHubActor channel closed, exiting"
                            );
                            self.graceful_shutdown();
                            break;
                        }
                    }
                }

                Some(expired) = self.timeouts.recv() => {
                    self.coordinator.handle_timeout(&self.registry, expired);
                }

                _ = health_check.tick() => {
                    self.check_connection_health().await;
                }
            }
        }

        self.cancel_token.cancel();

        info!(
            target: "ss.actor.hub",
            messages_processed = self.mailbox.messages_processed(),
            peak_depth = self.mailbox.peak_depth(),
            "SignalingHubActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    fn handle_message(&mut self, message: HubMessage) -> bool {
        match message {
            HubMessage::OpenConnection {
                binding,
                outbound,
                respond_to,
            } => {
                let result = self.open_connection(binding, outbound);
                let _ = respond_to.send(result);
            }

            HubMessage::ClientEvent {
                connection_id,
                event,
            } => {
                let started = Instant::now();
                let name = event.name();
                metrics::record_signaling_event(name);
                self.metrics.record_event();

                if let Err(e) = self.handle_client_event(connection_id, event) {
                    self.reply_error(connection_id, &e);
                }

                metrics::record_event_latency(name, started.elapsed());
            }

            HubMessage::MalformedFrame {
                connection_id,
                error,
            } => {
                metrics::record_signaling_event("malformed");
                self.reply_error(connection_id, &error);
            }

            HubMessage::Disconnect { connection_id } => {
                self.disconnect(connection_id);
            }

            HubMessage::DeliverMessage {
                message,
                respond_to,
            } => {
                let outcome = relay::deliver_new_message(&self.registry, &message);
                let _ = respond_to.send(outcome);
            }

            HubMessage::OnlineIdentities { respond_to } => {
                let _ = respond_to.send(self.registry.online_identities());
            }

            HubMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }

            HubMessage::Shutdown { respond_to } => {
                self.graceful_shutdown();
                let _ = respond_to.send(Ok(()));
                return true;
            }
        }

        false
    }

    fn open_connection(
        &mut self,
        binding: ConnectionBinding,
        outbound: mpsc::Sender<String>,
    ) -> Result<ConnectionId, SignalError> {
        if !self.accepting_new {
            return Err(SignalError::Draining);
        }

        let connection_id = ConnectionId::new();
        let (handle, task_handle) = ConnectionActor::spawn(
            connection_id,
            outbound,
            self.settings.connection_buffer,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );
        self.metrics.connection_opened();

        info!(
            target: "ss.actor.hub",
            connection_id = %connection_id,
            identity = ?binding.identity,
            authenticated = binding.authenticated,
            "Connection opened"
        );

        if let Some(identity) = binding.identity.clone() {
            self.bind(identity, &handle);
        } else {
            metrics::set_connections_active(self.registry.connection_count());
        }

        self.connections.insert(
            connection_id,
            ManagedConnection {
                handle,
                task_handle,
                binding,
            },
        );

        Ok(connection_id)
    }

    fn handle_client_event(
        &mut self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalError> {
        if let ClientEvent::Register(identity) = event {
            return self.handle_register(connection_id, identity);
        }

        let from = self
            .registry
            .identity_of(connection_id)
            .cloned()
            .ok_or(SignalError::NotRegistered)?;

        debug!(
            target: "ss.actor.hub",
            connection_id = %connection_id,
            from = %from,
            event = event.name(),
            "Processing client event"
        );

        match event {
            ClientEvent::Register(_) => Ok(()),

            ClientEvent::CallUser { to, offer } => self.handle_offer(connection_id, &from, &to, offer),

            ClientEvent::AnswerCall { to, answer } => {
                if let Err(e) = self.coordinator.answer(&self.registry, &from, &to, answer) {
                    debug!(
                        target: "ss.actor.hub",
                        from = %from,
                        to = %to,
                        error = %e,
                        "answer-call without a ringing call ignored"
                    );
                }
                Ok(())
            }

            ClientEvent::IceCandidate { to, candidate } => {
                self.coordinator
                    .ice_candidate(&self.registry, &from, &to, candidate);
                Ok(())
            }

            ClientEvent::RejectCall { to } => {
                if let Err(e) = self.coordinator.reject(&self.registry, &from, &to) {
                    debug!(
                        target: "ss.actor.hub",
                        from = %from,
                        to = %to,
                        error = %e,
                        "reject-call without a ringing call ignored"
                    );
                }
                Ok(())
            }

            ClientEvent::EndCall { to } => {
                self.coordinator.end(&self.registry, &from, &to);
                Ok(())
            }
        }
    }

    /// Bind (or confirm) a connection's identity.
    ///
    /// A connection authenticated at connect time may only confirm its own
    /// identity. Otherwise binding is only possible in anonymous mode, where
    /// a later `register` moves the connection to the new identity.
    fn handle_register(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
    ) -> Result<(), SignalError> {
        let Some(managed) = self.connections.get_mut(&connection_id) else {
            return Err(SignalError::ConnectionClosed);
        };

        if managed.binding.authenticated {
            if managed.binding.identity.as_ref() != Some(&identity) {
                warn!(
                    target: "ss.actor.hub",
                    connection_id = %connection_id,
                    claimed = %identity,
                    "register does not match authenticated identity"
                );
                return Err(SignalError::IdentityMismatch);
            }
        } else if !self.settings.allow_anonymous_identity {
            return Err(SignalError::Unauthorized(
                "register requires credentials".to_string(),
            ));
        } else {
            managed.binding.identity = Some(identity.clone());
        }

        let handle = managed.handle.clone();
        self.bind(identity, &handle);
        Ok(())
    }

    fn handle_offer(
        &mut self,
        connection_id: ConnectionId,
        from: &Identity,
        to: &Identity,
        offer: Value,
    ) -> Result<(), SignalError> {
        match self.coordinator.offer(&self.registry, from, to, offer) {
            Ok(_) => Ok(()),
            Err(e @ (SignalError::Busy | SignalError::CallConflict(_))) => {
                info!(
                    target: "ss.actor.hub",
                    from = %from,
                    to = %to,
                    reason = %e,
                    "Offer refused"
                );
                // Only the offering connection learns about the refusal.
                if let Some(managed) = self.connections.get(&connection_id) {
                    deliver_to(
                        std::slice::from_ref(&managed.handle),
                        &ServerEvent::CallRejected,
                        "signal",
                    );
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Register `handle` under `identity` and announce the result.
    fn bind(&mut self, identity: Identity, handle: &ConnectionActorHandle) {
        let change = self.registry.register(identity, handle.clone());
        self.after_change(&change, Some(handle));
    }

    fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(managed) = self.connections.remove(&connection_id) else {
            debug!(
                target: "ss.actor.hub",
                connection_id = %connection_id,
                "Disconnect for unknown connection ignored"
            );
            return;
        };

        managed.handle.close("disconnected");
        self.metrics.connection_closed();

        let change = self.registry.unregister(connection_id);
        self.after_change(&change, None);

        info!(
            target: "ss.actor.hub",
            connection_id = %connection_id,
            identity = ?managed.binding.identity,
            went_offline = change.went_offline.is_some(),
            "Connection closed"
        );
    }

    /// End the calls of anyone who went offline, then update presence.
    fn after_change(&mut self, change: &RegistryChange, joined: Option<&ConnectionActorHandle>) {
        if let Some(gone) = &change.went_offline {
            self.coordinator.identity_offline(&self.registry, gone);
        }
        presence::on_change(&self.registry, change, joined);
    }

    /// Send an `error` event to the originating connection only.
    fn reply_error(&self, connection_id: ConnectionId, err: &SignalError) {
        debug!(
            target: "ss.actor.hub",
            connection_id = %connection_id,
            error = %err,
            "Rejecting client event"
        );

        if let Some(managed) = self.connections.get(&connection_id) {
            deliver_to(
                std::slice::from_ref(&managed.handle),
                &ServerEvent::from_error(err),
                "error",
            );
        }
    }

    fn status(&self) -> HubStatus {
        HubStatus {
            open_connections: self.connections.len(),
            registered_connections: self.registry.connection_count(),
            online_identities: self.registry.identity_count(),
            active_calls: self.coordinator.active_calls(),
            accepting_new: self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
            peak_mailbox_depth: self.mailbox.peak_depth(),
        }
    }

    /// Reap connection actors whose task finished without a `Disconnect`.
    async fn check_connection_health(&mut self) {
        let finished: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for connection_id in finished {
            let Some(managed) = self.connections.remove(&connection_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    debug!(
                        target: "ss.actor.hub",
                        connection_id = %connection_id,
                        "Connection actor exited before disconnect"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "ss.actor.hub",
                        connection_id = %connection_id,
                        error = ?join_error,
                        "Connection actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Connection);
                }
                Err(_) => {}
            }

            self.metrics.connection_closed();
            let change = self.registry.unregister(connection_id);
            self.after_change(&change, None);
        }
    }

    fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        info!(
            target: "ss.actor.hub",
            connections = self.connections.len(),
            active_calls = self.coordinator.active_calls(),
            "Starting graceful shutdown"
        );

        for (_, managed) in self.connections.drain() {
            managed.handle.close("server shutting down");
            self.metrics.connection_closed();
        }
        self.registry = ConnectionRegistry::new();
        self.coordinator.shutdown();

        metrics::set_connections_active(0);
        metrics::set_online_identities(0);

        info!(target: "ss.actor.hub", "Graceful shutdown complete");
    }
}
