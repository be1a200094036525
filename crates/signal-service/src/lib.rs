//! Signal Service Library
//!
//! Real-time presence and call signaling for one-to-one chat:
//!
//! - Connection registry mapping identities to their live WebSocket connections
//! - Presence broadcast of the full online set on every membership change
//! - Call negotiation (offer/answer/ICE relay, ringing, timeout, cancel)
//! - Fan-out of persisted chat messages to every connection of the recipient
//!
//! # Architecture
//!
//! ```text
//! GET /socket ──► reader task ──► SignalingHubActor (singleton)
//!                                 ├── ConnectionRegistry
//!                                 ├── CallCoordinator ──► ring timers
//!                                 └── ConnectionActor (per socket) ──► writer task
//!
//! POST /api/messages/:id ──► MessageStore ──► hub fan-out
//! ```
//!
//! Every transport event is one message in the hub's mailbox and runs to
//! completion before the next, so registry mutation and the presence
//! broadcast it causes are never interleaved with another event.
//!
//! # Modules
//!
//! - [`actors`] - Hub and connection actors
//! - [`registry`] - Identity to connection map
//! - [`presence`] - Online-set broadcasts
//! - [`calls`] - Call sessions and the negotiation state machine
//! - [`relay`] - Best-effort fan-out helpers
//! - [`protocol`] - Wire events
//! - [`transport`] - WebSocket endpoint
//! - [`collaborators`] - Identity, message store and user directory seams

pub mod actors;
pub mod calls;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod transport;
