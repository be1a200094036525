//! Actor hierarchy for the Signal Service.
//!
//! ```text
//! SignalingHubActor (singleton, owns registry + call coordinator)
//! └── ConnectionActor (one per WebSocket, owns the outbound mailbox)
//! ```
//!
//! Handles talk to actors over bounded `mpsc` channels; request/response
//! messages carry a `oneshot` reply. The hub owns the root
//! `CancellationToken` and connection actors receive child tokens.

pub mod connection;
pub mod hub;
pub mod messages;
pub mod metrics;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use hub::{HubSettings, SignalingHubActor, SignalingHubHandle};
pub use messages::{ConnectionBinding, ConnectionMessage, HubMessage, HubStatus};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
