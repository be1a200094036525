//! Presence broadcasts.
//!
//! On every membership change the full online set goes to every connection.
//! No diffing, acknowledgement or retry.

use crate::observability::metrics;
use crate::protocol::ServerEvent;
use crate::registry::{ConnectionRegistry, EventSink, RegistryChange};
use crate::relay::{deliver_to, FanOut};
use tracing::debug;

/// Announce the current online set to every registered connection.
pub fn broadcast<H: EventSink>(registry: &ConnectionRegistry<H>) -> FanOut {
    let online = registry.online_identities();
    metrics::set_online_identities(online.len());
    metrics::set_connections_active(registry.connection_count());

    debug!(
        target: "ss.presence",
        online = online.len(),
        connections = registry.connection_count(),
        "Broadcasting online set"
    );

    deliver_to(
        &registry.all_handles(),
        &ServerEvent::GetOnlineUsers(online),
        "presence",
    )
}

/// Send the current online set to a single connection.
pub fn send_snapshot<H: EventSink>(registry: &ConnectionRegistry<H>, handle: &H) -> FanOut {
    deliver_to(
        std::slice::from_ref(handle),
        &ServerEvent::GetOnlineUsers(registry.online_identities()),
        "presence",
    )
}

/// React to a registry mutation.
///
/// A membership change is broadcast to everyone. A registration that did not
/// change membership (another tab of an online identity) still gets a
/// snapshot so the new connection can render presence.
pub fn on_change<H: EventSink>(
    registry: &ConnectionRegistry<H>,
    change: &RegistryChange,
    joined: Option<&H>,
) -> FanOut {
    if change.membership_changed() {
        broadcast(registry)
    } else if let Some(handle) = joined {
        metrics::set_connections_active(registry.connection_count());
        send_snapshot(registry, handle)
    } else {
        metrics::set_connections_active(registry.connection_count());
        FanOut::default()
    }
}
