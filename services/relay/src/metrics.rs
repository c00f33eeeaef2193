//! Observability counters for the relay
//!
//! Diagnostic only, never correctness-relevant. The reporter task logs a
//! snapshot of the counters on a fixed cadence, matching the upstream
//! publisher's periodic counter log.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Core counters for the relay service.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Full-state publications received from the bus.
    pub publications_received: AtomicU64,
    /// Publications dropped because the payload failed to decode.
    pub decode_failures: AtomicU64,
    /// Deltas delivered into session queues and mailboxes.
    pub deltas_broadcast: AtomicU64,
    /// Deltas dropped because a session queue or mailbox was full.
    pub send_drops: AtomicU64,
    /// Cache writes refused at capacity (channel degrades to full sync).
    pub cache_refusals: AtomicU64,
    /// Currently connected sessions (push and poll).
    pub sessions_connected: AtomicU64,
    /// Long-poll requests answered.
    pub polls_served: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publication(&self) {
        self.publications_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.deltas_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_drop(&self) {
        self.send_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_refusal(&self) {
        self.cache_refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.sessions_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturating: a double-close must not wrap the gauge.
        let _ = self
            .sessions_connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn record_poll_served(&self) {
        self.polls_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Export counters for the periodic log line.
    pub fn export(&self) -> BTreeMap<&'static str, u64> {
        let mut m = BTreeMap::new();
        m.insert(
            "publications_received",
            self.publications_received.load(Ordering::Relaxed),
        );
        m.insert("decode_failures", self.decode_failures.load(Ordering::Relaxed));
        m.insert("deltas_broadcast", self.deltas_broadcast.load(Ordering::Relaxed));
        m.insert("send_drops", self.send_drops.load(Ordering::Relaxed));
        m.insert("cache_refusals", self.cache_refusals.load(Ordering::Relaxed));
        m.insert(
            "sessions_connected",
            self.sessions_connected.load(Ordering::Relaxed),
        );
        m.insert("polls_served", self.polls_served.load(Ordering::Relaxed));
        m
    }
}

/// Log the counter snapshot on a fixed cadence.
pub async fn run_reporter(metrics: Arc<RelayMetrics>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately; skip it so the first line has data.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let snapshot = metrics.export();
        info!(
            publications = snapshot["publications_received"],
            broadcast = snapshot["deltas_broadcast"],
            decode_failures = snapshot["decode_failures"],
            send_drops = snapshot["send_drops"],
            sessions = snapshot["sessions_connected"],
            polls = snapshot["polls_served"],
            "relay counters"
        );
    }
}
