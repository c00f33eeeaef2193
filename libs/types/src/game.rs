//! Game snapshot and delta model
//!
//! A `GameSnapshot` is the authoritative full state of one tracked game at a
//! point in time. A `GameDelta` is the sparse patch between two successive
//! snapshots: identifier and timestamp always, every other tracked field only
//! when its value differs from the previous snapshot.
//!
//! Delta flow:
//! 1. Relay receives a full snapshot publication for a channel
//! 2. Diff against the cached previous snapshot (strict inequality per field)
//! 3. Emit the delta; a delta with no changed fields is still valid
//! 4. Clients apply deltas atop an initial full fetch to reconstruct state

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::GameId;

/// Full state of one tracked game.
///
/// `last_updated` is Unix milliseconds and monotonically non-decreasing
/// across successive publications for the same game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: GameId,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub home_odds: Decimal,
    pub away_odds: Decimal,
    pub draw_odds: Decimal,
    pub last_updated: i64,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Sparse patch between two successive snapshots of one game.
///
/// Identifier and timestamp are mandatory; tracked fields are present only
/// when changed. `full_sync` marks a delta that carries the complete
/// snapshot because the relay had no cached base (first contact, TTL
/// expiry, or relay restart), so a client holding local state can tell a
/// resync apart from an incremental update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDelta {
    pub id: GameId,
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub full_sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_odds: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_odds: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_odds: Option<Decimal>,
}

impl GameDelta {
    /// A full-sync delta carrying every tracked field of the snapshot.
    pub fn full(snapshot: &GameSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            last_updated: snapshot.last_updated,
            full_sync: true,
            home_team: Some(snapshot.home_team.clone()),
            away_team: Some(snapshot.away_team.clone()),
            home_score: Some(snapshot.home_score),
            away_score: Some(snapshot.away_score),
            home_odds: Some(snapshot.home_odds),
            away_odds: Some(snapshot.away_odds),
            draw_odds: Some(snapshot.draw_odds),
        }
    }

    /// Diff two successive snapshots of the same game.
    ///
    /// A tracked field appears in the result if and only if its value
    /// differs under strict inequality; a micro-change in an odds value
    /// still counts as changed.
    pub fn between(prev: &GameSnapshot, next: &GameSnapshot) -> Self {
        fn changed<T: PartialEq + Clone>(prev: &T, next: &T) -> Option<T> {
            if prev != next {
                Some(next.clone())
            } else {
                None
            }
        }

        Self {
            id: next.id.clone(),
            last_updated: next.last_updated,
            full_sync: false,
            home_team: changed(&prev.home_team, &next.home_team),
            away_team: changed(&prev.away_team, &next.away_team),
            home_score: changed(&prev.home_score, &next.home_score),
            away_score: changed(&prev.away_score, &next.away_score),
            home_odds: changed(&prev.home_odds, &next.home_odds),
            away_odds: changed(&prev.away_odds, &next.away_odds),
            draw_odds: changed(&prev.draw_odds, &next.draw_odds),
        }
    }

    /// Diff against an optional base: absent base yields a full-sync delta.
    pub fn compute(prev: Option<&GameSnapshot>, next: &GameSnapshot) -> Self {
        match prev {
            Some(prev) => Self::between(prev, next),
            None => Self::full(next),
        }
    }

    /// Whether the delta carries no tracked fields.
    ///
    /// Such a delta means "no tracked field changed" and is a valid
    /// message, not an error.
    pub fn is_empty(&self) -> bool {
        self.home_team.is_none()
            && self.away_team.is_none()
            && self.home_score.is_none()
            && self.away_score.is_none()
            && self.home_odds.is_none()
            && self.away_odds.is_none()
            && self.draw_odds.is_none()
    }

    /// Number of tracked fields present in the delta.
    pub fn changed_field_count(&self) -> usize {
        self.home_team.is_some() as usize
            + self.away_team.is_some() as usize
            + self.home_score.is_some() as usize
            + self.away_score.is_some() as usize
            + self.home_odds.is_some() as usize
            + self.away_odds.is_some() as usize
            + self.draw_odds.is_some() as usize
    }
}

impl GameSnapshot {
    /// Apply a delta in place, updating only the fields it carries.
    ///
    /// The caller is responsible for matching `delta.id` to this snapshot;
    /// the update itself is atomic under the single `&mut`, so a snapshot
    /// is never partially stale within one entity.
    pub fn apply(&mut self, delta: &GameDelta) {
        if let Some(v) = &delta.home_team {
            self.home_team = v.clone();
        }
        if let Some(v) = &delta.away_team {
            self.away_team = v.clone();
        }
        if let Some(v) = delta.home_score {
            self.home_score = v;
        }
        if let Some(v) = delta.away_score {
            self.away_score = v;
        }
        if let Some(v) = delta.home_odds {
            self.home_odds = v;
        }
        if let Some(v) = delta.away_odds {
            self.away_odds = v;
        }
        if let Some(v) = delta.draw_odds {
            self.draw_odds = v;
        }
        self.last_updated = delta.last_updated;
    }
}
