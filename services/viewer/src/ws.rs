//! WebSocket push transport
//!
//! Real implementation of the push seam over tokio-tungstenite. Frames
//! that fail to decode are logged and skipped rather than killing the
//! connection, mirroring the relay's per-message isolation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use types::messages::{ClientMessage, ServerMessage};

use crate::transport::{PushConnector, PushSession, TransportError};

/// Connects to the relay's `/v1/ws` endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn PushSession>, TransportError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        debug!(url = %self.url, "push transport connected");
        Ok(Box::new(WsSession { stream }))
    }
}

struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushSession for WsSession {
    async fn next(&mut self) -> Result<Option<ServerMessage>, TransportError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(error)) => return Err(TransportError::Closed(error.to_string())),
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(error) => warn!(%error, "skipping undecodable frame"),
                },
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => {}
            }
        }
    }

    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(&message)
            .map_err(|error| TransportError::Protocol(error.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|error| TransportError::Closed(error.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
