//! External collaborators consumed by the signaling core.
//!
//! Authentication, message persistence and the contact list live outside
//! this service. Each is reached through an async trait so the hub and the
//! HTTP handlers never depend on a concrete backend. In-memory
//! implementations let the binary run standalone.

pub mod identity;
pub mod message_store;
pub mod user_directory;

pub use identity::{IdentityResolver, JwtIdentityResolver};
pub use message_store::{InMemoryMessageStore, MessageStore, NewMessage, StoredMessage};
pub use user_directory::{InMemoryUserDirectory, UserDirectory, UserSummary};
