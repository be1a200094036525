//! Connection registry: which live connections belong to which identity.
//!
//! The registry is owned by the hub actor and is never shared, so it needs
//! no locking. Every mutation reports the membership change it caused so the
//! caller can decide whether a presence broadcast is due.
//!
//! Invariants:
//! - A connection appears under at most one identity.
//! - An identity is present iff it owns at least one connection.

use crate::errors::SignalError;
use crate::protocol::ServerEvent;
use common::types::{ConnectionId, Identity};
use std::collections::{BTreeMap, HashMap};

/// Something that can receive server events for one connection.
///
/// Delivery must not block: the hub calls this from inside its message loop.
pub trait EventSink: Clone + Send + 'static {
    /// Registry key for this sink.
    fn connection_id(&self) -> ConnectionId;

    /// Queue `event` for the connection.
    ///
    /// Returns `Backpressure` when the mailbox is full and `ConnectionClosed`
    /// when the connection is gone. Either way the event is dropped.
    fn deliver(&self, event: ServerEvent) -> Result<(), SignalError>;
}

/// Membership effect of one registry mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChange {
    /// Identity that went from zero to one connection.
    pub came_online: Option<Identity>,
    /// Identity whose last connection was removed.
    pub went_offline: Option<Identity>,
}

impl RegistryChange {
    /// Whether the online set changed.
    pub fn membership_changed(&self) -> bool {
        self.came_online.is_some() || self.went_offline.is_some()
    }
}

/// Identity → live connections map.
pub struct ConnectionRegistry<H: EventSink> {
    // BTreeMap keeps the online set sorted without a copy-and-sort per broadcast.
    by_identity: BTreeMap<Identity, HashMap<ConnectionId, H>>,
    owners: HashMap<ConnectionId, Identity>,
}

impl<H: EventSink> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: EventSink> ConnectionRegistry<H> {
    pub fn new() -> Self {
        Self {
            by_identity: BTreeMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Bind `handle` to `identity`.
    ///
    /// Idempotent for a handle already under `identity`. A handle registered
    /// under another identity is moved, which may take the old identity
    /// offline in the same step.
    pub fn register(&mut self, identity: Identity, handle: H) -> RegistryChange {
        let connection_id = handle.connection_id();
        let mut change = RegistryChange::default();

        match self.owners.get(&connection_id) {
            Some(owner) if owner == &identity => return change,
            Some(_) => {
                change.went_offline = self.unregister(connection_id).went_offline;
            }
            None => {}
        }

        let connections = self.by_identity.entry(identity.clone()).or_default();
        if connections.is_empty() {
            change.came_online = Some(identity.clone());
        }
        connections.insert(connection_id, handle);
        self.owners.insert(connection_id, identity);

        change
    }

    /// Remove a connection from whichever identity owns it.
    ///
    /// Unknown connections are a no-op.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> RegistryChange {
        let Some(identity) = self.owners.remove(&connection_id) else {
            return RegistryChange::default();
        };

        let now_empty = match self.by_identity.get_mut(&identity) {
            Some(connections) => {
                connections.remove(&connection_id);
                connections.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.by_identity.remove(&identity);
            RegistryChange {
                came_online: None,
                went_offline: Some(identity),
            }
        } else {
            RegistryChange::default()
        }
    }

    /// Snapshot of the connections owned by `identity`; empty when offline.
    pub fn lookup(&self, identity: &Identity) -> Vec<H> {
        self.by_identity
            .get(identity)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted online set.
    pub fn online_identities(&self) -> Vec<Identity> {
        self.by_identity.keys().cloned().collect()
    }

    pub fn is_online(&self, identity: &Identity) -> bool {
        self.by_identity.contains_key(identity)
    }

    /// Identity a connection is registered under, if any.
    pub fn identity_of(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.owners.get(&connection_id)
    }

    /// Every registered connection.
    pub fn all_handles(&self) -> Vec<H> {
        self.by_identity
            .values()
            .flat_map(|connections| connections.values().cloned())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.owners.len()
    }

    pub fn identity_count(&self) -> usize {
        self.by_identity.len()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    #[test]
    fn test_register_brings_identity_online() {
        let mut registry = ConnectionRegistry::new();
        let c1 = RecordingSink::new();

        let change = registry.register(id("u1"), c1.clone());

        assert_eq!(change.came_online, Some(id("u1")));
        assert!(change.went_offline.is_none());
        assert_eq!(registry.online_identities(), vec![id("u1")]);
        assert_eq!(registry.identity_of(c1.connection_id()), Some(&id("u1")));
    }

    #[test]
    fn test_double_register_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let c1 = RecordingSink::new();

        registry.register(id("u1"), c1.clone());
        let change = registry.register(id("u1"), c1.clone());

        assert!(!change.membership_changed());
        assert_eq!(registry.lookup(&id("u1")).len(), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_second_connection_does_not_change_membership() {
        let mut registry = ConnectionRegistry::new();

        registry.register(id("u1"), RecordingSink::new());
        let change = registry.register(id("u1"), RecordingSink::new());

        assert!(!change.membership_changed());
        assert_eq!(registry.lookup(&id("u1")).len(), 2);
        assert_eq!(registry.identity_count(), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut registry: ConnectionRegistry<RecordingSink> = ConnectionRegistry::new();
        registry.register(id("u1"), RecordingSink::new());

        let change = registry.unregister(ConnectionId::new());

        assert!(!change.membership_changed());
        assert_eq!(registry.online_identities(), vec![id("u1")]);
    }

    #[test]
    fn test_unregister_one_of_two_keeps_identity_online() {
        let mut registry = ConnectionRegistry::new();
        let c1 = RecordingSink::new();
        let c2 = RecordingSink::new();
        registry.register(id("u1"), c1.clone());
        registry.register(id("u1"), c2.clone());

        let first = registry.unregister(c1.connection_id());
        assert!(!first.membership_changed());
        assert!(registry.is_online(&id("u1")));

        let second = registry.unregister(c2.connection_id());
        assert_eq!(second.went_offline, Some(id("u1")));
        assert!(!registry.is_online(&id("u1")));
        assert!(registry.lookup(&id("u1")).is_empty());
    }

    #[test]
    fn test_register_under_new_identity_moves_handle() {
        let mut registry = ConnectionRegistry::new();
        let c1 = RecordingSink::new();
        registry.register(id("u1"), c1.clone());

        let change = registry.register(id("u2"), c1.clone());

        assert_eq!(change.went_offline, Some(id("u1")));
        assert_eq!(change.came_online, Some(id("u2")));
        assert_eq!(registry.online_identities(), vec![id("u2")]);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_online_identities_sorted() {
        let mut registry = ConnectionRegistry::new();
        for name in ["carol", "alice", "bob"] {
            registry.register(id(name), RecordingSink::new());
        }

        assert_eq!(
            registry.online_identities(),
            vec![id("alice"), id("bob"), id("carol")]
        );
        assert_eq!(registry.all_handles().len(), 3);
    }

    #[test]
    fn test_online_iff_owns_connection_over_interleavings() {
        let mut registry = ConnectionRegistry::new();
        let sinks: Vec<(Identity, RecordingSink)> = (0..12)
            .map(|i| (id(&format!("u{}", i % 4)), RecordingSink::new()))
            .collect();

        // Register everything, then tear down in a different order, checking
        // the presence invariant after every step.
        let check = |registry: &ConnectionRegistry<RecordingSink>| {
            for i in 0..4 {
                let who = id(&format!("u{i}"));
                assert_eq!(registry.is_online(&who), !registry.lookup(&who).is_empty());
            }
            let total: usize = registry
                .online_identities()
                .iter()
                .map(|who| registry.lookup(who).len())
                .sum();
            assert_eq!(total, registry.connection_count());
        };

        for (who, sink) in &sinks {
            registry.register(who.clone(), sink.clone());
            check(&registry);
        }
        for (_, sink) in sinks.iter().rev().step_by(2) {
            registry.unregister(sink.connection_id());
            check(&registry);
        }
        for (_, sink) in &sinks {
            registry.unregister(sink.connection_id());
            check(&registry);
        }

        assert_eq!(registry.identity_count(), 0);
    }
}
