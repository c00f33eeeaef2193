//! Push transport: one WebSocket per viewing session
//!
//! The socket's outbound side drains the session's bounded queue, so
//! broadcast deltas and request-scoped replies share one ordered stream.
//! Registry state for the session is discarded on disconnect; clients
//! re-send their subscription set on every new connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use types::ids::SessionId;
use types::messages::{ClientMessage, ServerMessage};

use crate::clock;
use crate::registry::SessionSink;
use crate::state::{RelayState, SharedState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let session = SessionId::new();
    let (queue_tx, mut queue_rx) = mpsc::channel(state.config.session_queue_capacity);
    state
        .registry
        .write()
        .connect(session, SessionSink::Push(queue_tx.clone()));
    state.metrics.session_opened();
    debug!(%session, "push session connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    for reply in handle_client_message(&state, session, &text) {
                        // Replies share the session queue so they stay
                        // ordered with broadcast deltas; a full queue
                        // drops the reply rather than blocking the reader.
                        if queue_tx.try_send(reply).is_err() {
                            state.metrics.record_send_drop();
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%session, %error, "push socket error");
                    break;
                }
            },
            outgoing = queue_rx.recv() => match outgoing {
                Some(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(error) => {
                            warn!(%session, %error, "failed to encode outbound message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    if state.registry.write().drop_session(session) {
        state.metrics.session_closed();
    }
    debug!(%session, "push session disconnected");
}

/// Handle one inbound frame; returns the request-scoped replies.
///
/// A malformed frame or rejected request answers only this session and
/// leaves every other session's registry state untouched.
pub(crate) fn handle_client_message(
    state: &RelayState,
    session: SessionId,
    text: &str,
) -> Vec<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(error) => {
            return vec![ServerMessage::Error {
                message: format!("malformed message: {error}"),
            }];
        }
    };

    match message {
        ClientMessage::Subscribe { game_ids } => {
            match state.registry.write().join(session, &game_ids) {
                Ok(()) => Vec::new(),
                Err(error) => vec![ServerMessage::Error {
                    message: error.to_string(),
                }],
            }
        }
        ClientMessage::Unsubscribe { game_ids } => {
            match state.registry.write().leave(session, &game_ids) {
                Ok(()) => Vec::new(),
                Err(error) => vec![ServerMessage::Error {
                    message: error.to_string(),
                }],
            }
        }
        ClientMessage::Initial { game_ids } => {
            if game_ids.is_empty() || game_ids.iter().any(|id| !id.is_valid()) {
                return vec![ServerMessage::Error {
                    message: "malformed game id list".to_string(),
                }];
            }
            let now = clock::now_millis();
            let cache = state.cache.read();
            let data = game_ids
                .iter()
                .filter_map(|id| cache.get(id, now).cloned())
                .collect();
            vec![ServerMessage::Initial { data }]
        }
    }
}
