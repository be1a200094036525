//! Observability for the Signal Service.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` and log only
//! identities and connection ids. Tokens and message bodies never reach logs
//! or metric labels. Labels are bounded:
//! - `event`: wire event names (~14 values)
//! - `outcome`: call outcomes (answered, rejected, cancelled, timed_out, disconnected, refused)
//! - `kind`: fan-out kinds (signal, presence, message, error)
//! - `reason`: drop reasons (offline, backpressure, closed, buffer_full)
//! - `actor_type`: 2 values (hub, connection)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ss_connections_active` | Gauge | none | Live WebSocket connections |
//! | `ss_online_identities` | Gauge | none | Identities with at least one connection |
//! | `ss_calls_active` | Gauge | none | Non-ended call sessions |
//! | `ss_signaling_events_total` | Counter | `event` | Inbound events processed |
//! | `ss_call_outcomes_total` | Counter | `outcome` | How calls ended |
//! | `ss_fanout_deliveries_total` | Counter | `kind` | Events handed to connection mailboxes |
//! | `ss_events_dropped_total` | Counter | `reason` | Events that reached no mailbox |
//! | `ss_messages_relayed_total` | Counter | none | Chat messages fanned out |
//! | `ss_event_latency_seconds` | Histogram | `event` | Hub processing time per event |
//! | `ss_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
