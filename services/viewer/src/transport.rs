//! Transport seams for the transport manager
//!
//! The manager's state machine is written against these traits rather than
//! concrete sockets, so its transitions and guards are testable with
//! scripted fakes. `ws::WsConnector` and `poll::HttpPoller` are the real
//! implementations.

use async_trait::async_trait;
use thiserror::Error;
use types::game::{GameDelta, GameSnapshot};
use types::ids::{GameId, SessionId};
use types::messages::{ClientMessage, ServerMessage};

/// Errors from either transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport closed: {0}")]
    Closed(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Establishes push connections.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushSession>, TransportError>;
}

/// One live push connection.
#[async_trait]
pub trait PushSession: Send {
    /// The next server message. `Ok(None)` is a clean close. Must be
    /// cancel-safe: the manager polls it inside a select.
    async fn next(&mut self) -> Result<Option<ServerMessage>, TransportError>;

    /// Send a protocol message to the relay.
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError>;

    /// Best-effort close of the underlying connection.
    async fn close(&mut self);
}

/// The guaranteed-available fallback transport.
#[async_trait]
pub trait PollTransport: Send + Sync {
    /// Immediately-answered full-state fetch for the listed games.
    async fn fetch_initial(
        &self,
        game_ids: &[GameId],
    ) -> Result<Vec<GameSnapshot>, TransportError>;

    /// Long-poll for accrued deltas; held by the relay until a batch is
    /// ready or its bounded wait elapses (an empty batch is "no news").
    async fn poll(
        &self,
        client_id: SessionId,
        game_ids: &[GameId],
    ) -> Result<Vec<GameDelta>, TransportError>;
}
