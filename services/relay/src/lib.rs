//! Delta Relay Service
//!
//! Consumes full-state game publications from the upstream bus and produces:
//! - Minimal per-game deltas relative to a TTL-bounded snapshot cache
//! - Fan-out to push (WebSocket) and long-poll subscribers
//! - Initial-state snapshots for client sync
//! - An in-process demo publisher standing in for the upstream odds feed
//!
//! # Architecture
//!
//! ```text
//! Upstream publications (per-game channels, FIFO per channel)
//!        │
//!    ┌───▼────┐
//!    │ Ingest │  ← Decodes, isolates malformed payloads
//!    └───┬────┘
//!        │
//!   ┌────▼─────┐     ┌────────────────┐
//!   │  Delta   │ ←→  │ Snapshot Cache │  (TTL per channel)
//!   └────┬─────┘     └────────────────┘
//!        │
//!   ┌────▼─────────────────────┐
//!   │ Subscription Registry    │  (interest index per channel)
//!   └────┬─────────────────────┘
//!        │
//!  ┌─────▼──────┐  ┌───────────────┐
//!  │ Push queues│  │ Poll mailboxes│
//!  └────────────┘  └───────────────┘
//! ```
//!
//! The bus substrate must deliver messages published on one channel in
//! publish order (FIFO per channel); the relay inherits this guarantee
//! rather than enforcing it. See `bus::UpstreamBus`.

pub mod bus;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailbox;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod router;
pub mod simulator;
pub mod state;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
