//! Common utilities and types shared across Parley components.

#![warn(clippy::pedantic)]

/// Module for identifiers shared between the signaling core and its collaborators
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for user token claims and validation helpers
pub mod jwt;
