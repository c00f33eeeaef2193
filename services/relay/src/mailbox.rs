//! Bounded delta mailbox for long-poll sessions
//!
//! Deltas fanned out to a polling session accrue here between polls. The
//! mailbox is drop-oldest on overflow so a stalled poller costs bounded
//! memory and never blocks fan-out to other sessions. A waiting poll
//! request parks on the notify until a delta lands or its bounded wait
//! elapses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use tokio::sync::Notify;
use types::game::GameDelta;

/// Per-session delta queue drained by long-poll requests.
#[derive(Debug)]
pub struct PollMailbox {
    deltas: Mutex<VecDeque<GameDelta>>,
    notify: Notify,
    capacity: usize,
    /// Unix millis of the most recent poll touching this mailbox.
    last_poll: AtomicI64,
    /// Deltas discarded because the queue was full.
    dropped: AtomicU64,
}

impl PollMailbox {
    pub fn new(capacity: usize, now: i64) -> Self {
        Self {
            deltas: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            last_poll: AtomicI64::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a delta and wake any parked poll request.
    ///
    /// Returns true if an older delta was discarded to make room.
    pub fn push(&self, delta: GameDelta) -> bool {
        let dropped_oldest = {
            let mut queue = self.deltas.lock();
            let overflow = queue.len() >= self.capacity;
            if overflow {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(delta);
            overflow
        };
        self.notify.notify_one();
        dropped_oldest
    }

    /// Drain everything queued right now.
    pub fn drain(&self) -> Vec<GameDelta> {
        self.deltas.lock().drain(..).collect()
    }

    /// Wait until at least one delta is queued or `max_wait` elapses, then
    /// drain. An empty result means "no news" and the client polls again.
    pub async fn wait_batch(&self, max_wait: Duration) -> Vec<GameDelta> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let drained = self.drain();
            if !drained.is_empty() {
                return drained;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Vec::new();
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {
                    return self.drain();
                }
            }
        }
    }

    /// Record poll activity for idle sweeping.
    pub fn touch(&self, now: i64) {
        self.last_poll.store(now, Ordering::Relaxed);
    }

    /// Whether no poll has touched this mailbox within `idle_ms`.
    pub fn is_idle(&self, now: i64, idle_ms: i64) -> bool {
        now - self.last_poll.load(Ordering::Relaxed) > idle_ms
    }

    /// Total deltas discarded on overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of deltas currently queued.
    pub fn len(&self) -> usize {
        self.deltas.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
