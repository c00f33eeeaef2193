//! Local game store
//!
//! Per-session cache of the last known full snapshot per game,
//! reconstructed by applying deltas atop an initial full fetch. A delta
//! applies atomically, so fields are never partially stale within one
//! entity — only "stale as of the last delivered update".
//!
//! Deltas never insert: a full fetch is the only sanctioned way to learn
//! of a new entity, and a delta older than the held snapshot is ignored so
//! a duplicate delivered across a transport switch cannot regress state.

use std::collections::BTreeMap;

use types::game::{GameDelta, GameSnapshot};
use types::ids::GameId;

/// What happened when a delta was offered to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The matching game was patched.
    Applied,
    /// No matching game held locally; the delta was ignored.
    UnknownId,
    /// The delta predates the held snapshot; ignored.
    Stale,
}

/// Client-side entity cache, keyed by game id.
#[derive(Debug, Default)]
pub struct GameStore {
    games: BTreeMap<GameId, GameSnapshot>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full snapshot (initial-fetch responses).
    pub fn insert(&mut self, snapshot: GameSnapshot) {
        self.games.insert(snapshot.id.clone(), snapshot);
    }

    /// Offer a delta; only the fields it carries are updated.
    pub fn apply_delta(&mut self, delta: &GameDelta) -> ApplyOutcome {
        match self.games.get_mut(&delta.id) {
            None => ApplyOutcome::UnknownId,
            Some(game) => {
                if delta.last_updated < game.last_updated {
                    ApplyOutcome::Stale
                } else {
                    game.apply(delta);
                    ApplyOutcome::Applied
                }
            }
        }
    }

    /// Drop a game (unsubscribe). Returns whether it was held.
    pub fn remove(&mut self, id: &GameId) -> bool {
        self.games.remove(id).is_some()
    }

    pub fn get(&self, id: &GameId) -> Option<&GameSnapshot> {
        self.games.get(id)
    }

    pub fn games(&self) -> impl Iterator<Item = &GameSnapshot> {
        self.games.values()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Discard everything (session teardown).
    pub fn clear(&mut self) {
        self.games.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn odds_delta(id: &str, home_odds: Decimal, last_updated: i64) -> GameDelta {
        GameDelta {
            id: GameId::new(id),
            last_updated,
            full_sync: false,
            home_team: None,
            away_team: None,
            home_score: None,
            away_score: None,
            home_odds: Some(home_odds),
            away_odds: None,
            draw_odds: None,
        }
    }

    #[test]
    fn test_delta_patches_known_game() {
        let mut store = GameStore::new();
        store.insert(snapshot("game1", Decimal::new(230, 2), 1000));

        let outcome = store.apply_delta(&odds_delta("game1", Decimal::new(250, 2), 1200));
        assert_eq!(outcome, ApplyOutcome::Applied);

        let game = store.get(&GameId::new("game1")).unwrap();
        assert_eq!(game.home_odds, Decimal::new(250, 2));
        assert_eq!(game.away_odds, Decimal::new(280, 2));
        assert_eq!(game.last_updated, 1200);
    }

    #[test]
    fn test_unknown_id_ignored_not_inserted() {
        let mut store = GameStore::new();
        let outcome = store.apply_delta(&odds_delta("game9", Decimal::new(250, 2), 1200));
        assert_eq!(outcome, ApplyOutcome::UnknownId);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_delta_ignored() {
        let mut store = GameStore::new();
        store.insert(snapshot("game1", Decimal::new(230, 2), 1000));

        let outcome = store.apply_delta(&odds_delta("game1", Decimal::new(210, 2), 900));
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(
            store.get(&GameId::new("game1")).unwrap().home_odds,
            Decimal::new(230, 2)
        );
    }

    #[test]
    fn test_duplicate_delta_is_idempotent() {
        let mut store = GameStore::new();
        store.insert(snapshot("game1", Decimal::new(230, 2), 1000));
        let delta = odds_delta("game1", Decimal::new(250, 2), 1200);

        store.apply_delta(&delta);
        // Same delta redelivered across a transport switch
        assert_eq!(store.apply_delta(&delta), ApplyOutcome::Applied);
        assert_eq!(
            store.get(&GameId::new("game1")).unwrap().home_odds,
            Decimal::new(250, 2)
        );
    }

    #[test]
    fn test_insert_replaces_whole_snapshot() {
        let mut store = GameStore::new();
        store.insert(snapshot("game1", Decimal::new(230, 2), 1000));
        store.insert(snapshot("game1", Decimal::new(300, 2), 2000));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&GameId::new("game1")).unwrap().home_odds,
            Decimal::new(300, 2)
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = GameStore::new();
        store.insert(snapshot("game1", Decimal::new(230, 2), 1000));
        store.insert(snapshot("game2", Decimal::new(180, 2), 1000));

        assert!(store.remove(&GameId::new("game1")));
        assert!(!store.remove(&GameId::new("game1")));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
