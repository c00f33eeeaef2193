//! Types library for the oddswire live-odds feed
//!
//! This library provides the type definitions shared by the delta relay
//! service and the viewer client, ensuring both sides of the wire agree on
//! identifiers, the game data model, and message framing.
//!
//! # Modules
//! - `ids`: Unique identifiers (GameId, SessionId)
//! - `game`: Game snapshot and delta model with diff/apply operations
//! - `messages`: Tagged wire messages exchanged over push and poll transports

// Public modules
pub mod game;
pub mod ids;
pub mod messages;

// Odds values are decimals throughout; re-exported so downstream crates
// do not need a direct rust_decimal dependency.
pub use rust_decimal::Decimal;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::game::*;
    pub use crate::ids::*;
    pub use crate::messages::*;
    pub use crate::Decimal;
}
