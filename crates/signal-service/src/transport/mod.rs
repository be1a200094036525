//! Client transport.
//!
//! `GET /socket` upgrades to a WebSocket carrying JSON event frames (see
//! [`crate::protocol`]). Each socket is split into a reader task that decodes
//! frames and forwards them to the hub in arrival order, and a writer task
//! that drains the frames produced by the connection's actor.

pub mod websocket;

pub use websocket::{socket_handler, SocketParams};
