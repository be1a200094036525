//! HTTP middleware for the Signal Service.

pub mod auth;
