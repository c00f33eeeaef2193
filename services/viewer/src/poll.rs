//! HTTP long-poll transport
//!
//! Real implementation of the poll seam over reqwest. The client-side
//! request timeout leaves headroom over the relay's poll wait so a held
//! request is never cut off by its own client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use types::game::{GameDelta, GameSnapshot};
use types::ids::{GameId, SessionId};
use types::messages::{InitialRequest, PollRequest, ServerMessage};

use crate::transport::{PollTransport, TransportError};

/// Headroom over the relay's default 25 s poll wait.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

/// Talks to the relay's `/v1/poll` and `/v1/initial` endpoints.
pub struct HttpPoller {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPoller {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, http })
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ServerMessage, TransportError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        // Error statuses still carry a wire-shaped {type: "error"} body.
        response
            .json()
            .await
            .map_err(|error| TransportError::Protocol(error.to_string()))
    }
}

#[async_trait]
impl PollTransport for HttpPoller {
    async fn fetch_initial(
        &self,
        game_ids: &[GameId],
    ) -> Result<Vec<GameSnapshot>, TransportError> {
        let request = InitialRequest {
            game_ids: game_ids.to_vec(),
        };
        match self.post("/v1/initial", &request).await? {
            ServerMessage::Initial { data } => Ok(data),
            ServerMessage::Error { message } => Err(TransportError::Protocol(message)),
            _ => Err(TransportError::Protocol(
                "unexpected response to initial request".to_string(),
            )),
        }
    }

    async fn poll(
        &self,
        client_id: SessionId,
        game_ids: &[GameId],
    ) -> Result<Vec<GameDelta>, TransportError> {
        let request = PollRequest {
            client_id,
            game_ids: game_ids.to_vec(),
        };
        match self.post("/v1/poll", &request).await? {
            ServerMessage::Batch { deltas } => Ok(deltas),
            ServerMessage::Error { message } => Err(TransportError::Protocol(message)),
            _ => Err(TransportError::Protocol(
                "unexpected response to poll request".to_string(),
            )),
        }
    }
}
