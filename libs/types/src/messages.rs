//! Wire messages exchanged between viewer clients and the delta relay
//!
//! Both transports carry the same payload shapes: the push connection
//! exchanges `ClientMessage`/`ServerMessage` frames, the poll transport
//! posts `PollRequest`/`InitialRequest` bodies and receives a
//! `ServerMessage` back. Every message kind is a variant of an
//! exhaustively-matched tagged enum, so adding a kind is a compile-checked
//! change.

use serde::{Deserialize, Serialize};

use crate::game::{GameDelta, GameSnapshot};
use crate::ids::{GameId, SessionId};

/// Messages sent from a viewer client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Add the listed games to this session's subscription set.
    Subscribe { game_ids: Vec<GameId> },
    /// Remove the listed games from this session's subscription set.
    Unsubscribe { game_ids: Vec<GameId> },
    /// Request full snapshots for the listed games.
    Initial { game_ids: Vec<GameId> },
}

/// Messages sent from the relay to a viewer client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshots answering an initial-state request.
    Initial { data: Vec<GameSnapshot> },
    /// A single delta, delivered over the push transport.
    Delta { data: GameDelta },
    /// Accrued deltas answering a long-poll request. Always batched,
    /// even for a single delta; empty means "no news, poll again".
    Batch { deltas: Vec<GameDelta> },
    /// Request-scoped error, delivered only to the requesting session.
    Error { message: String },
}

/// Body of a long-poll request.
///
/// Held by the relay until a batch accrues or the bounded wait elapses.
/// The game list is authoritative for the polling session's subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub client_id: SessionId,
    pub game_ids: Vec<GameId>,
}

/// Body of an initial-state fetch, answered immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialRequest {
    pub game_ids: Vec<GameId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn sample_snapshot() -> GameSnapshot {
        GameSnapshot {
            id: GameId::new("game1"),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            home_score: 1,
            away_score: 1,
            home_odds: Decimal::new(250, 2),
            away_odds: Decimal::new(280, 2),
            draw_odds: Decimal::new(320, 2),
            last_updated: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_subscribe_wire_shape() {
        let msg = ClientMessage::Subscribe {
            game_ids: vec![GameId::new("game1"), GameId::new("game2")],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "subscribe", "gameIds": ["game1", "game2"]})
        );
    }

    #[test]
    fn test_unsubscribe_wire_shape() {
        let msg = ClientMessage::Unsubscribe {
            game_ids: vec![GameId::new("game1")],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "unsubscribe");
        assert_eq!(json["gameIds"][0], "game1");
    }

    #[test]
    fn test_delta_message_wire_shape() {
        let snap = sample_snapshot();
        let msg = ServerMessage::Delta {
            data: GameDelta::full(&snap),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "delta");
        assert_eq!(json["data"]["id"], "game1");
        assert_eq!(json["data"]["fullSync"], true);
    }

    #[test]
    fn test_batch_is_always_a_list() {
        let msg = ServerMessage::Batch { deltas: vec![] };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "batch", "deltas": []}));
    }

    #[test]
    fn test_error_wire_shape() {
        let msg = ServerMessage::Error {
            message: "malformed game id list".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "malformed game id list");
    }

    #[test]
    fn test_initial_response_roundtrip() {
        let msg = ServerMessage::Initial {
            data: vec![sample_snapshot()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_poll_request_wire_shape() {
        let req = PollRequest {
            client_id: SessionId::new(),
            game_ids: vec![GameId::new("game3")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("clientId").is_some());
        assert_eq!(json["gameIds"][0], "game3");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport","gameIds":[]}"#);
        assert!(err.is_err());
    }
}
