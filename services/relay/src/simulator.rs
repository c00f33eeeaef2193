//! Demo odds publisher
//!
//! In-process stand-in for the external upstream feed: a handful of seeded
//! games whose odds random-walk on a fixed tick, published as full-state
//! JSON on each game's channel. Seeded ChaCha RNG keeps a demo run
//! reproducible under a fixed seed.
//!
//! Each tick gives every game a chance of an update; within an updated
//! game each odds field steps independently, floored so odds never dip to
//! even money. Scores stay at their seeded values.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};
use types::game::GameSnapshot;
use types::ids::GameId;
use types::Decimal;

use crate::bus::BusPublisher;
use crate::clock;

/// Tuning knobs for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Publication cadence.
    pub tick: Duration,
    /// Chance per tick that a game publishes an update.
    pub update_probability: f64,
    /// Chance that each odds field steps within an update.
    pub field_step_probability: f64,
    /// Largest single step, in hundredths.
    pub max_step_cents: i64,
    /// Odds below this floor are not applied.
    pub min_odds: Decimal,
    /// RNG seed; a fixed seed reproduces a run exactly.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            update_probability: 0.9,
            field_step_probability: 0.6,
            max_step_cents: 30,
            min_odds: Decimal::new(101, 2),
            seed: 7,
        }
    }
}

/// The demo game roster: three fixtures with starting scores and odds.
pub fn seed_games() -> Vec<GameSnapshot> {
    let now = clock::now_millis();
    let game = |id: &str, home: &str, away: &str, hs: u32, aws: u32, ho: i64, ao: i64, dr: i64| {
        GameSnapshot {
            id: GameId::new(id),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: hs,
            away_score: aws,
            home_odds: Decimal::new(ho, 2),
            away_odds: Decimal::new(ao, 2),
            draw_odds: Decimal::new(dr, 2),
            last_updated: now,
        }
    };

    vec![
        game("game1", "Arsenal", "Chelsea", 1, 1, 250, 280, 320),
        game("game2", "Liverpool", "Man United", 2, 0, 180, 420, 350),
        game("game3", "Barcelona", "Real Madrid", 0, 0, 210, 330, 300),
    ]
}

/// Random-walk odds generator over a fixed game roster.
pub struct OddsSimulator {
    config: SimulatorConfig,
    games: BTreeMap<GameId, GameSnapshot>,
    rng: ChaCha8Rng,
}

impl OddsSimulator {
    pub fn new(config: SimulatorConfig, games: Vec<GameSnapshot>) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let games = games
            .into_iter()
            .map(|game| (game.id.clone(), game))
            .collect();
        Self { config, games, rng }
    }

    /// Advance one tick; returns the snapshots to publish.
    ///
    /// An updated game is published even when no odds field actually
    /// stepped, so downstream sees the occasional "nothing changed"
    /// publication exactly as the real feed produces them.
    pub fn tick(&mut self, now: i64) -> Vec<GameSnapshot> {
        let mut published = Vec::new();

        for game in self.games.values_mut() {
            if !self.rng.gen_bool(self.config.update_probability) {
                continue;
            }

            for odds in [
                &mut game.home_odds,
                &mut game.away_odds,
                &mut game.draw_odds,
            ] {
                if !self.rng.gen_bool(self.config.field_step_probability) {
                    continue;
                }
                let step = Decimal::new(
                    self.rng
                        .gen_range(-self.config.max_step_cents..=self.config.max_step_cents),
                    2,
                );
                let next = *odds + step;
                if next > self.config.min_odds {
                    *odds = next;
                }
            }

            game.last_updated = now;
            published.push(game.clone());
        }

        published
    }

    /// All current game states, for the startup burst.
    pub fn current_games(&self) -> Vec<GameSnapshot> {
        self.games.values().cloned().collect()
    }

    /// Publish forever on the configured cadence.
    ///
    /// Starts with a burst of every seeded game so first subscribers see
    /// data right away. Publish failures are counted and logged, never
    /// fatal.
    pub async fn run(mut self, publisher: BusPublisher) {
        info!(games = self.games.len(), "odds simulator publishing");

        let mut publish_errors: u64 = 0;
        for snapshot in self.current_games() {
            publish(&publisher, &snapshot, &mut publish_errors);
        }

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = clock::now_millis();
            for snapshot in self.tick(now) {
                publish(&publisher, &snapshot, &mut publish_errors);
            }
        }
    }
}

fn publish(publisher: &BusPublisher, snapshot: &GameSnapshot, publish_errors: &mut u64) {
    let payload = match serde_json::to_vec(snapshot) {
        Ok(payload) => payload,
        Err(error) => {
            *publish_errors += 1;
            warn!(game = %snapshot.id, %error, "failed to encode game state");
            return;
        }
    };
    if let Err(error) = publisher.publish(snapshot.id.clone(), payload) {
        *publish_errors += 1;
        warn!(game = %snapshot.id, %error, errors = *publish_errors, "publish failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_games_roster() {
        let games = seed_games();
        assert_eq!(games.len(), 3);
        assert_eq!(games[0].home_team, "Arsenal");
        assert_eq!(games[1].home_score, 2);
    }

    #[test]
    fn test_same_seed_same_walk() {
        let mut a = OddsSimulator::new(SimulatorConfig::default(), seed_games());
        let mut b = OddsSimulator::new(SimulatorConfig::default(), seed_games());

        for tick in 0..50 {
            let now = 1_700_000_000_000 + tick * 200;
            assert_eq!(a.tick(now), b.tick(now));
        }
    }

    #[test]
    fn test_odds_respect_floor() {
        let config = SimulatorConfig {
            max_step_cents: 500,
            ..SimulatorConfig::default()
        };
        let mut simulator = OddsSimulator::new(config.clone(), seed_games());

        // Seed odds start above the floor and a step only applies when the
        // result clears it, so odds stay strictly above the floor forever.
        for tick in 0..200 {
            for game in simulator.tick(1_700_000_000_000 + tick * 200) {
                for odds in [game.home_odds, game.away_odds, game.draw_odds] {
                    assert!(odds > config.min_odds, "odds {odds} fell to the floor");
                }
            }
        }
    }

    #[test]
    fn test_tick_stamps_timestamp() {
        let mut simulator = OddsSimulator::new(SimulatorConfig::default(), seed_games());
        let published = simulator.tick(1_700_000_000_000);
        for game in &published {
            assert_eq!(game.last_updated, 1_700_000_000_000);
        }
        assert!(published.len() <= 3);
    }
}
