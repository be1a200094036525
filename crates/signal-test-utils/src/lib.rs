//! # Signal Test Utilities
//!
//! Shared test utilities for the Signal Service.
//!
//! This crate provides:
//! - Server test harness (`TestSignalServer` for end-to-end tests)
//! - WebSocket test client (`TestSocket`)
//! - Token and SDP fixtures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signal_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestSignalServer::spawn().await.unwrap();
//!     let mut alice = TestSocket::connect(&server, "alice").await;
//!
//!     let event = alice.next_event().await;
//!     assert_eq!(event, ServerEvent::GetOnlineUsers(vec!["alice".into()]));
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod socket;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use socket::*;

pub use signal_service::protocol::{ClientEvent, ServerEvent};
