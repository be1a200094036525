//! `ConnectionActor` - per-WebSocket connection actor.
//!
//! Each `ConnectionActor`:
//! - Owns the outbound side of exactly one WebSocket connection
//! - Receives server events from the hub and encodes them as text frames
//! - Hands frames to the transport's writer task in mailbox order
//!
//! # Lifecycle
//!
//! 1. Spawned by the hub when the transport opens a connection
//! 2. Runs until closed by the hub, the writer task goes away, or cancelled
//! 3. Cancellation via child token propagates from the hub

use crate::errors::SignalError;
use crate::protocol::ServerEvent;
use crate::registry::EventSink;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
}

impl ConnectionActorHandle {
    /// Ask the actor to close. Never blocks; a full mailbox cancels instead.
    pub fn close(&self, reason: &str) {
        let message = ConnectionMessage::Close {
            reason: reason.to_string(),
        };
        if self.sender.try_send(message).is_err() {
            self.cancel_token.cancel();
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl EventSink for ConnectionActorHandle {
    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn deliver(&self, event: ServerEvent) -> Result<(), SignalError> {
        self.sender
            .try_send(ConnectionMessage::Send { event })
            .map_err(|e| match e {
                TrySendError::Full(_) => SignalError::Backpressure,
                TrySendError::Closed(_) => SignalError::ConnectionClosed,
            })
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: ConnectionId,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Encoded frames for the transport's writer task.
    outbound: mpsc::Sender<String>,
    /// Child of the hub's token.
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    frames_sent: u64,
}

impl ConnectionActor {
    /// Spawn a new connection actor with a mailbox of `buffer` events.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        outbound: mpsc::Sender<String>,
        buffer: usize,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));

        let actor = Self {
            connection_id,
            receiver,
            outbound,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, connection_id.to_string()),
            frames_sent: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "ss.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "ss.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "ss.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_received(self.receiver.len());
                            let should_exit = self.handle_message(message).await;
                            if self.receiver.is_empty() {
                                self.mailbox.record_idle();
                            }

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "ss.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(
            target: "ss.actor.connection",
            connection_id = %self.connection_id,
            frames_sent = self.frames_sent,
            messages_processed = self.mailbox.messages_processed(),
            peak_depth = self.mailbox.peak_depth(),
            "ConnectionActor stopped"
        );
        // Dropping `outbound` here ends the writer task, which closes the socket.
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Send { event } => self.handle_send(&event).await,

            ConnectionMessage::Close { reason } => {
                debug!(
                    target: "ss.actor.connection",
                    connection_id = %self.connection_id,
                    reason = %reason,
                    "Closing connection"
                );
                true
            }
        }
    }

    /// Encode and forward one event. Returns true once the writer is gone.
    async fn handle_send(&mut self, event: &ServerEvent) -> bool {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    target: "ss.actor.connection",
                    connection_id = %self.connection_id,
                    event = event.name(),
                    error = %e,
                    "Failed to encode event, skipping"
                );
                return false;
            }
        };

        if self.outbound.send(frame).await.is_err() {
            debug!(
                target: "ss.actor.connection",
                connection_id = %self.connection_id,
                "Writer task gone, exiting"
            );
            return true;
        }

        self.frames_sent += 1;
        self.metrics.record_event();
        false
    }
}
