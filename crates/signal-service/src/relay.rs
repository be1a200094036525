//! Fan-out of server events to every live connection of an identity.
//!
//! Delivery is best-effort: an offline target or a full mailbox drops the
//! event for that connection, counts it, and carries on.

use crate::collaborators::StoredMessage;
use crate::errors::SignalError;
use crate::observability::metrics;
use crate::protocol::ServerEvent;
use crate::registry::{ConnectionRegistry, EventSink};
use common::types::Identity;
use tracing::{debug, warn};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub failed: usize,
}

impl FanOut {
    /// Nothing reached any connection.
    pub fn is_empty(&self) -> bool {
        self.delivered == 0
    }
}

/// Deliver `event` to each handle, counting successes under `kind`.
pub fn deliver_to<H: EventSink>(handles: &[H], event: &ServerEvent, kind: &str) -> FanOut {
    let mut outcome = FanOut::default();

    for handle in handles {
        match handle.deliver(event.clone()) {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                outcome.failed += 1;
                let reason = match e {
                    SignalError::Backpressure => "backpressure",
                    _ => "closed",
                };
                metrics::record_event_dropped(reason);
                warn!(
                    target: "ss.relay",
                    connection_id = %handle.connection_id(),
                    event = event.name(),
                    reason,
                    "Dropped event for connection"
                );
            }
        }
    }

    metrics::record_fanout_deliveries(kind, outcome.delivered);
    outcome
}

/// Deliver a signaling event to every connection of `target`.
///
/// An offline target is a silent drop.
pub fn fan_out<H: EventSink>(
    registry: &ConnectionRegistry<H>,
    target: &Identity,
    event: &ServerEvent,
) -> FanOut {
    let handles = registry.lookup(target);
    if handles.is_empty() {
        metrics::record_event_dropped("offline");
        debug!(
            target: "ss.relay",
            target_identity = %target,
            event = event.name(),
            "Target offline, event dropped"
        );
        return FanOut::default();
    }

    deliver_to(&handles, event, "signal")
}

/// Push a freshly persisted chat message to every connection of its recipient.
///
/// The lookup happens at call time, after the store write has completed, so
/// connections opened while the write was in flight are included.
pub fn deliver_new_message<H: EventSink>(
    registry: &ConnectionRegistry<H>,
    message: &StoredMessage,
) -> FanOut {
    let handles = registry.lookup(&message.recipient_id);
    if handles.is_empty() {
        debug!(
            target: "ss.relay",
            recipient = %message.recipient_id,
            "Recipient offline, message kept for history only"
        );
        return FanOut::default();
    }

    let outcome = deliver_to(&handles, &ServerEvent::NewMessage(message.clone()), "message");
    metrics::record_message_relayed();
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::test_support::RecordingSink;
    use chrono::Utc;
    use common::types::MessageId;

    fn message_to(recipient: &str) -> StoredMessage {
        StoredMessage {
            id: MessageId::new(),
            sender_id: Identity::from("sender"),
            recipient_id: Identity::from(recipient),
            text: Some("hi".to_string()),
            image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fan_out_reaches_every_connection() {
        let mut registry = ConnectionRegistry::new();
        let sinks: Vec<RecordingSink> = (0..3).map(|_| RecordingSink::new()).collect();
        for sink in &sinks {
            registry.register(Identity::from("x"), sink.clone());
        }

        let outcome = fan_out(&registry, &Identity::from("x"), &ServerEvent::CallEnded);

        assert_eq!(outcome, FanOut { delivered: 3, failed: 0 });
        for sink in &sinks {
            assert_eq!(sink.take(), vec![ServerEvent::CallEnded]);
        }
    }

    #[test]
    fn test_fan_out_to_offline_is_silent() {
        let registry: ConnectionRegistry<RecordingSink> = ConnectionRegistry::new();
        let outcome = fan_out(&registry, &Identity::from("nobody"), &ServerEvent::CallEnded);
        assert!(outcome.is_empty());
        assert_eq!(outcome.failed, 0);
    }

    #[test]
    fn test_closed_connection_does_not_block_others() {
        let mut registry = ConnectionRegistry::new();
        let open = RecordingSink::new();
        let closed = RecordingSink::new();
        closed.close();
        registry.register(Identity::from("x"), open.clone());
        registry.register(Identity::from("x"), closed.clone());

        let outcome = fan_out(&registry, &Identity::from("x"), &ServerEvent::CallRejected);

        assert_eq!(outcome, FanOut { delivered: 1, failed: 1 });
        assert_eq!(open.take(), vec![ServerEvent::CallRejected]);
    }

    #[test]
    fn test_new_message_reaches_all_recipient_connections() {
        let mut registry = ConnectionRegistry::new();
        let c1 = RecordingSink::new();
        let c2 = RecordingSink::new();
        let other = RecordingSink::new();
        registry.register(Identity::from("u2"), c1.clone());
        registry.register(Identity::from("u2"), c2.clone());
        registry.register(Identity::from("u3"), other.clone());

        let message = message_to("u2");
        let outcome = deliver_new_message(&registry, &message);

        assert_eq!(outcome.delivered, 2);
        assert_eq!(c1.take(), vec![ServerEvent::NewMessage(message.clone())]);
        assert_eq!(c2.take(), vec![ServerEvent::NewMessage(message)]);
        assert!(other.take().is_empty());
    }

    #[test]
    fn test_new_message_to_offline_recipient() {
        let registry: ConnectionRegistry<RecordingSink> = ConnectionRegistry::new();
        assert!(deliver_new_message(&registry, &message_to("u9")).is_empty());
    }
}
