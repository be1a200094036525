//! Call signaling: per-call sessions and the coordinator that drives them.

pub mod coordinator;
pub mod session;

pub use coordinator::{CallCoordinator, TimerExpired};
pub use session::{CallSession, CallState, PartyPhase, MAX_PENDING_CANDIDATES};
