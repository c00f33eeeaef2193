//! Viewer client for the oddswire feed
//!
//! Owns exactly one active transport per viewing session: a persistent
//! WebSocket push connection while it holds, degrading to HTTP long-polling
//! after a budget of consecutive push failures. Local game state is
//! reconciled from whichever transport is active — an initial full fetch
//! establishes the entities, deltas patch them in place.
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────────┐ commands ┌─────────────┐
//!        │   ViewerHandle   ├─────────▶│  Transport  │
//!        └──────────────────┘          │   Manager   │
//!        ┌──────────────────┐  events  │ (3 states)  │
//!        │ presentation (UI)│◀─────────┤             │
//!        └──────────────────┘          └──┬───────┬──┘
//!                                 push ┌──▼──┐ ┌──▼───┐ poll
//!                                      │ ws  │ │ http │
//!                                      └─────┘ └──────┘
//! ```
//!
//! The state machine's transitions and guards are the contract; the
//! transports behind the `PushConnector`/`PollTransport` seams are
//! swappable, which is also how the machine is tested.

pub mod backoff;
pub mod manager;
pub mod poll;
pub mod store;
pub mod transport;
pub mod ws;

// Library version
pub const CLIENT_VERSION: &str = "0.1.0";
