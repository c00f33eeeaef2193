//! Configuration for the relay service
//!
//! Defaults suit the in-process demo deployment; every knob can be
//! overridden from the environment (`ODDSWIRE_*` variables), following the
//! upstream publisher's env-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;
use types::ids::GameId;

/// Configuration for the relay service.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// HTTP/WS listen address.
    pub bind_addr: SocketAddr,
    /// Snapshot cache time-to-live, reset on every write.
    pub cache_ttl_ms: i64,
    /// Maximum number of cached channels.
    pub cache_capacity: usize,
    /// Bounded outbound queue size per push session.
    pub session_queue_capacity: usize,
    /// Bounded delta mailbox size per poll session (drop-oldest on overflow).
    pub poll_mailbox_capacity: usize,
    /// How long a poll request is held open waiting for a batch.
    pub poll_wait: Duration,
    /// Poll sessions idle past this bound are swept.
    pub poll_idle_timeout_ms: i64,
    /// Maximum subscriptions per session.
    pub max_subscriptions_per_session: usize,
    /// Channels the relay subscribes to on the upstream bus.
    pub tracked_games: Vec<GameId>,
    /// Cadence of the periodic metrics log line.
    pub metrics_log_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            cache_ttl_ms: 60_000,
            cache_capacity: 1024,
            session_queue_capacity: 256,
            poll_mailbox_capacity: 1024,
            poll_wait: Duration::from_secs(25),
            poll_idle_timeout_ms: 90_000,
            max_subscriptions_per_session: 50,
            tracked_games: vec![
                GameId::new("game1"),
                GameId::new("game2"),
                GameId::new("game3"),
            ],
            metrics_log_interval: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Build a config from the environment, falling back to defaults for
    /// unset or unparsable variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_env("ODDSWIRE_BIND") {
            config.bind_addr = addr;
        }
        if let Some(ttl) = parse_env("ODDSWIRE_CACHE_TTL_MS") {
            config.cache_ttl_ms = ttl;
        }
        if let Some(capacity) = parse_env("ODDSWIRE_CACHE_CAPACITY") {
            config.cache_capacity = capacity;
        }
        if let Some(secs) = parse_env::<u64>("ODDSWIRE_POLL_WAIT_SECS") {
            config.poll_wait = Duration::from_secs(secs);
        }
        if let Some(idle) = parse_env("ODDSWIRE_POLL_IDLE_TIMEOUT_MS") {
            config.poll_idle_timeout_ms = idle;
        }
        if let Ok(games) = std::env::var("ODDSWIRE_GAMES") {
            let parsed: Vec<GameId> = games
                .split(',')
                .filter_map(|g| GameId::try_new(g.trim()))
                .collect();
            if parsed.is_empty() {
                warn!(value = %games, "ODDSWIRE_GAMES has no usable ids; keeping defaults");
            } else {
                config.tracked_games = parsed;
            }
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "unparsable env override ignored");
            None
        }
    }
}
