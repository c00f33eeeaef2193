//! Delta relay core
//!
//! Turns each inbound full-state publication into a minimal change-set
//! against the snapshot cache and fans it out to every interested session.
//! Processing is per-message isolated: a malformed payload is logged and
//! dropped without disturbing the channel, and a refused cache write only
//! degrades that channel to full-sync deltas.
//!
//! Fan-out never blocks on a slow session: push queues are `try_send`,
//! poll mailboxes drop their oldest entry on overflow.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::game::{GameDelta, GameSnapshot};

use crate::bus::Publication;
use crate::clock;
use crate::registry::SessionSink;
use crate::state::{RelayState, SharedState};
use types::messages::ServerMessage;

/// Consume the publication stream until the bus closes it.
///
/// A single consumer task preserves the bus's per-channel FIFO ordering
/// end to end.
pub async fn run(state: SharedState, mut publications: mpsc::Receiver<Publication>) {
    info!("delta relay consuming publications");
    while let Some(publication) = publications.recv().await {
        process_publication(&state, publication, clock::now_millis());
    }
    info!("publication stream closed; relay ingest stopping");
}

/// Process one publication: decode, diff, cache, fan out.
pub fn process_publication(state: &RelayState, publication: Publication, now: i64) {
    state.metrics.record_publication();

    let snapshot: GameSnapshot = match serde_json::from_slice(&publication.payload) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(channel = %publication.channel, %error, "dropping malformed publication");
            state.metrics.record_decode_failure();
            return;
        }
    };

    if snapshot.id != publication.channel {
        warn!(
            channel = %publication.channel,
            payload_id = %snapshot.id,
            "dropping publication whose payload id does not match its channel"
        );
        state.metrics.record_decode_failure();
        return;
    }

    let delta = {
        // One lock scope covers the read-modify-write on this channel's
        // entry; publications for other channels only contend briefly.
        let mut cache = state.cache.write();
        let delta = GameDelta::compute(cache.get(&publication.channel, now), &snapshot);
        if let Err(error) = cache.put(snapshot, now) {
            warn!(%error, "snapshot cache refused write; channel degrades to full sync");
            state.metrics.record_cache_refusal();
        }
        delta
    };

    broadcast_delta(state, delta);
}

/// Fan a delta out to every session subscribed to its channel.
pub fn broadcast_delta(state: &RelayState, delta: GameDelta) {
    let targets = state.registry.read().interested(&delta.id);
    if targets.is_empty() {
        return;
    }

    let mut dead = Vec::new();
    for (session, sink) in targets {
        match sink {
            SessionSink::Push(queue) => {
                match queue.try_send(ServerMessage::Delta {
                    data: delta.clone(),
                }) {
                    Ok(()) => state.metrics.record_broadcast(),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(%session, channel = %delta.id, "push queue full; delta dropped");
                        state.metrics.record_send_drop();
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(session),
                }
            }
            SessionSink::Poll(mailbox) => {
                if mailbox.push(delta.clone()) {
                    state.metrics.record_send_drop();
                }
                state.metrics.record_broadcast();
            }
        }
    }

    if !dead.is_empty() {
        let mut registry = state.registry.write();
        for session in dead {
            if registry.drop_session(session) {
                debug!(%session, "dropped session with closed push queue");
                state.metrics.session_closed();
            }
        }
    }
}

/// Periodically drop poll sessions that stopped polling and expired cache
/// entries.
pub async fn run_maintenance(state: SharedState) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let now = clock::now_millis();

        let removed = state
            .registry
            .write()
            .sweep_idle_polls(now, state.config.poll_idle_timeout_ms);
        for session in &removed {
            debug!(%session, "swept idle poll session");
            state.metrics.session_closed();
        }

        let expired = state.cache.write().sweep(now);
        if expired > 0 {
            debug!(expired, "swept expired cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use types::ids::{GameId, SessionId};
    use types::Decimal;

    fn snapshot(id: &str, home_odds: Decimal, last_updated: i64) -> GameSnapshot {
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

    fn publication(snapshot: &GameSnapshot) -> Publication {
        Publication {
            channel: snapshot.id.clone(),
            payload: serde_json::to_vec(snapshot).unwrap(),
        }
    }

    fn state_with_push_session(
        queue_size: usize,
    ) -> (RelayState, SessionId, mpsc::Receiver<ServerMessage>) {
        let state = RelayState::new(RelayConfig::default());
        let session = SessionId::new();
        let (tx, rx) = mpsc::channel(queue_size);
        {
            let mut registry = state.registry.write();
            registry.connect(session, SessionSink::Push(tx));
            registry.join(session, &[GameId::new("game1")]).unwrap();
        }
        (state, session, rx)
    }

    fn recv_delta(rx: &mut mpsc::Receiver<ServerMessage>) -> GameDelta {
        match rx.try_recv().unwrap() {
            ServerMessage::Delta { data } => data,
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_publication_is_full_sync() {
        let (state, _, mut rx) = state_with_push_session(16);

        let snap = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&snap), 1000);

        let delta = recv_delta(&mut rx);
        assert!(delta.full_sync);
        assert_eq!(delta.changed_field_count(), 7);
    }

    #[tokio::test]
    async fn test_second_publication_is_minimal() {
        let (state, _, mut rx) = state_with_push_session(16);

        let first = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&first), 1000);
        let _ = recv_delta(&mut rx);

        let mut second = first.clone();
        second.home_odds = Decimal::new(250, 2);
        second.last_updated = 1200;
        process_publication(&state, publication(&second), 1200);

        let delta = recv_delta(&mut rx);
        assert!(!delta.full_sync);
        assert_eq!(delta.home_odds, Some(Decimal::new(250, 2)));
        assert_eq!(delta.changed_field_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_expiry_yields_full_sync_again() {
        let (state, _, mut rx) = state_with_push_session(16);
        let ttl = state.config.cache_ttl_ms;

        let first = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&first), 1000);
        let _ = recv_delta(&mut rx);

        let mut second = first.clone();
        second.last_updated = 1000 + ttl + 1;
        process_publication(&state, publication(&second), 1000 + ttl + 1);

        let delta = recv_delta(&mut rx);
        assert!(delta.full_sync);
    }

    #[tokio::test]
    async fn test_empty_delta_still_broadcast_and_cached() {
        let (state, _, mut rx) = state_with_push_session(16);

        let first = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&first), 1000);
        let _ = recv_delta(&mut rx);

        // Identical fields, newer timestamp: empty delta, TTL still reset
        let mut second = first.clone();
        second.last_updated = 1500;
        process_publication(&state, publication(&second), 1500);

        let delta = recv_delta(&mut rx);
        assert!(delta.is_empty());
        assert_eq!(delta.last_updated, 1500);

        let cache = state.cache.read();
        assert_eq!(
            cache
                .get(&GameId::new("game1"), 1500)
                .unwrap()
                .last_updated,
            1500
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_isolated() {
        let (state, _, mut rx) = state_with_push_session(16);

        process_publication(
            &state,
            Publication {
                channel: GameId::new("game1"),
                payload: b"not json".to_vec(),
            },
            1000,
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(state.metrics.export()["decode_failures"], 1);

        // Channel keeps working afterwards
        let snap = snapshot("game1", Decimal::new(230, 2), 2000);
        process_publication(&state, publication(&snap), 2000);
        assert!(recv_delta(&mut rx).full_sync);
    }

    #[tokio::test]
    async fn test_channel_id_mismatch_dropped() {
        let (state, _, mut rx) = state_with_push_session(16);

        let snap = snapshot("game2", Decimal::new(230, 2), 1000);
        process_publication(
            &state,
            Publication {
                channel: GameId::new("game1"),
                payload: serde_json::to_vec(&snap).unwrap(),
            },
            1000,
        );

        assert!(rx.try_recv().is_err());
        assert_eq!(state.metrics.export()["decode_failures"], 1);
    }

    #[tokio::test]
    async fn test_fanout_only_to_subscribed_sessions() {
        let state = RelayState::new(RelayConfig::default());

        let interested = SessionId::new();
        let (tx1, mut rx1) = mpsc::channel(16);
        let bystander = SessionId::new();
        let (tx2, mut rx2) = mpsc::channel(16);
        {
            let mut registry = state.registry.write();
            registry.connect(interested, SessionSink::Push(tx1));
            registry.join(interested, &[GameId::new("game1")]).unwrap();
            registry.connect(bystander, SessionSink::Push(tx2));
            registry.join(bystander, &[GameId::new("game2")]).unwrap();
        }

        let snap = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&snap), 1000);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_push_queue_drops_without_blocking() {
        let (state, _, mut rx) = state_with_push_session(1);

        let first = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&first), 1000);

        let mut second = first.clone();
        second.home_odds = Decimal::new(250, 2);
        second.last_updated = 1100;
        process_publication(&state, publication(&second), 1100);

        assert_eq!(state.metrics.export()["send_drops"], 1);
        // The queued first delta is intact
        assert!(recv_delta(&mut rx).full_sync);
    }

    #[tokio::test]
    async fn test_closed_push_queue_drops_session() {
        let (state, session, rx) = state_with_push_session(16);
        drop(rx);

        let snap = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&snap), 1000);

        assert!(state.registry.read().subscriptions(session).is_none());
    }

    #[tokio::test]
    async fn test_fanout_to_poll_mailbox() {
        let state = RelayState::new(RelayConfig::default());
        let session = SessionId::new();
        let (mailbox, _) = state
            .registry
            .write()
            .ensure_poll_session(session, &[GameId::new("game1")], 64, 0)
            .unwrap();

        let snap = snapshot("game1", Decimal::new(230, 2), 1000);
        process_publication(&state, publication(&snap), 1000);

        let queued = mailbox.drain();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].full_sync);
    }
}
