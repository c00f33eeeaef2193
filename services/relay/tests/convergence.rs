//! End-to-end relay tests
//!
//! Drives the relay core with the seeded simulator feed and checks that a
//! subscriber applying the delta stream in order reconstructs the server's
//! final state exactly, plus the HTTP poll and initial-state surfaces.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::mpsc;
use tower::ServiceExt;

use relay::bus::Publication;
use relay::config::RelayConfig;
use relay::registry::SessionSink;
use relay::relay::process_publication;
use relay::router::create_router;
use relay::simulator::{seed_games, OddsSimulator, SimulatorConfig};
use relay::state::{RelayState, SharedState};
use types::game::GameSnapshot;
use types::ids::{GameId, SessionId};
use types::messages::{InitialRequest, PollRequest, ServerMessage};
use types::Decimal;

fn publication(snapshot: &GameSnapshot) -> Publication {
    Publication {
        channel: snapshot.id.clone(),
        payload: serde_json::to_vec(snapshot).unwrap(),
    }
}

fn sample_snapshot(id: &str, home_odds: Decimal, last_updated: i64) -> GameSnapshot {
    GameSnapshot {
        id: GameId::new(id),
        home_team: "Arsenal".to_string(),
        away_team: "Chelsea".to_string(),
        home_score: 0,
        away_score: 0,
        home_odds,
        away_odds: Decimal::new(280, 2),
        draw_odds: Decimal::new(320, 2),
        last_updated,
    }
}

#[tokio::test]
async fn push_subscriber_converges_on_simulated_feed() {
    let state = Arc::new(RelayState::new(RelayConfig::default()));
    let session = SessionId::new();
    let (tx, mut rx) = mpsc::channel(8192);
    let all_games: Vec<GameId> = seed_games().into_iter().map(|g| g.id).collect();
    {
        let mut registry = state.registry.write();
        registry.connect(session, SessionSink::Push(tx));
        registry.join(session, &all_games).unwrap();
    }

    let mut simulator = OddsSimulator::new(SimulatorConfig::default(), seed_games());
    let mut now = 1_700_000_000_000i64;

    // Startup burst warms the cache; the client then takes its initial
    // state from the same cache, exactly like the initial-state fetch.
    for snapshot in simulator.current_games() {
        process_publication(&state, publication(&snapshot), now);
    }
    let mut local: BTreeMap<GameId, GameSnapshot> = {
        let cache = state.cache.read();
        all_games
            .iter()
            .map(|id| (id.clone(), cache.get(id, now).unwrap().clone()))
            .collect()
    };

    for _ in 0..200 {
        now += 200;
        for snapshot in simulator.tick(now) {
            process_publication(&state, publication(&snapshot), now);
        }
    }

    // Apply the unbroken, in-order delta stream.
    while let Ok(message) = rx.try_recv() {
        let ServerMessage::Delta { data } = message else {
            panic!("push session received non-delta message");
        };
        if let Some(game) = local.get_mut(&data.id) {
            game.apply(&data);
        }
    }

    // Client state must match the relay's authoritative cache.
    let cache = state.cache.read();
    for id in &all_games {
        assert_eq!(
            local.get(id),
            cache.get(id, now),
            "client diverged on {id}"
        );
    }
}

#[tokio::test]
async fn unsubscribe_stops_and_resubscribe_restores_delivery() {
    let state = Arc::new(RelayState::new(RelayConfig::default()));
    let session = SessionId::new();
    let (tx, mut rx) = mpsc::channel(64);
    let game1 = [GameId::new("game1")];
    {
        let mut registry = state.registry.write();
        registry.connect(session, SessionSink::Push(tx));
        registry.join(session, &game1).unwrap();
    }

    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(230, 2), 1000)),
        1000,
    );
    assert!(rx.try_recv().is_ok(), "subscribed session should receive");

    state.registry.write().leave(session, &game1).unwrap();
    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(240, 2), 1100)),
        1100,
    );
    assert!(rx.try_recv().is_err(), "unsubscribed session must not receive");

    state.registry.write().join(session, &game1).unwrap();
    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(250, 2), 1200)),
        1200,
    );
    let message = rx.try_recv().expect("resubscribed session receives again");
    let ServerMessage::Delta { data } = message else {
        panic!("expected delta");
    };
    assert_eq!(data.home_odds, Some(Decimal::new(250, 2)));
}

async fn post_json(app: axum::Router, uri: &str, body: Vec<u8>) -> (StatusCode, ServerMessage) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn initial_endpoint_serves_cached_snapshots() {
    let state: SharedState = Arc::new(RelayState::new(RelayConfig::default()));
    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(230, 2), 1000)),
        relay::clock::now_millis(),
    );

    let body = serde_json::to_vec(&InitialRequest {
        game_ids: vec![GameId::new("game1"), GameId::new("game2")],
    })
    .unwrap();
    let (status, message) = post_json(create_router(state), "/v1/initial", body).await;

    assert_eq!(status, StatusCode::OK);
    let ServerMessage::Initial { data } = message else {
        panic!("expected initial response, got {message:?}");
    };
    // game2 has never published; it is simply absent from the response
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].id, GameId::new("game1"));
}

#[tokio::test]
async fn initial_endpoint_rejects_malformed_list() {
    let state: SharedState = Arc::new(RelayState::new(RelayConfig::default()));
    let body = serde_json::to_vec(&InitialRequest { game_ids: vec![] }).unwrap();
    let (status, message) = post_json(create_router(state), "/v1/initial", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(matches!(message, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn poll_endpoint_returns_empty_then_batched_deltas() {
    let config = RelayConfig {
        poll_wait: Duration::from_millis(50),
        ..RelayConfig::default()
    };
    let state: SharedState = Arc::new(RelayState::new(config));
    let app = create_router(state.clone());
    let client_id = SessionId::new();

    let poll_body = |client_id| {
        serde_json::to_vec(&PollRequest {
            client_id,
            game_ids: vec![GameId::new("game1")],
        })
        .unwrap()
    };

    // First poll registers the session; nothing has accrued yet.
    let (status, message) = post_json(app.clone(), "/v1/poll", poll_body(client_id)).await;
    assert_eq!(status, StatusCode::OK);
    let ServerMessage::Batch { deltas } = message else {
        panic!("expected batch");
    };
    assert!(deltas.is_empty(), "no news means an empty batch");

    // Two publications accrue between polls and arrive as one batch.
    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(230, 2), 1000)),
        1000,
    );
    process_publication(
        &state,
        publication(&sample_snapshot("game1", Decimal::new(250, 2), 1200)),
        1200,
    );

    let (status, message) = post_json(app, "/v1/poll", poll_body(client_id)).await;
    assert_eq!(status, StatusCode::OK);
    let ServerMessage::Batch { deltas } = message else {
        panic!("expected batch");
    };
    assert_eq!(deltas.len(), 2);
    assert!(deltas[0].full_sync);
    assert_eq!(deltas[1].home_odds, Some(Decimal::new(250, 2)));
}

#[tokio::test]
async fn poll_endpoint_rejects_malformed_list() {
    let state: SharedState = Arc::new(RelayState::new(RelayConfig::default()));
    let body = serde_json::to_vec(&PollRequest {
        client_id: SessionId::new(),
        game_ids: vec![],
    })
    .unwrap();
    let (status, message) = post_json(create_router(state), "/v1/poll", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(matches!(message, ServerMessage::Error { .. }));
}
