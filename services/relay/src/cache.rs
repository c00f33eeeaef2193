//! Per-channel snapshot cache for delta computation
//!
//! Stores the last full snapshot seen on each channel with a fixed
//! time-to-live that resets on every write, never on read. Absence (first
//! publication, TTL elapsed, relay restart) makes the next delta a full
//! sync; the cache is a convenience for delta computation and is never
//! consulted for correctness of a channel's live state.
//!
//! Entry count is bounded. A refused write for a new channel is the
//! non-fatal single-channel degraded path: that channel keeps emitting
//! full-sync deltas until capacity frees.

use std::collections::BTreeMap;

use types::game::GameSnapshot;
use types::ids::GameId;

/// Errors from snapshot cache writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache at capacity ({capacity}); refusing new channel {channel}")]
    AtCapacity { channel: GameId, capacity: usize },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: GameSnapshot,
    expires_at: i64,
}

/// TTL-bounded store of the last snapshot per channel.
///
/// Uses BTreeMap for deterministic iteration.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: BTreeMap<GameId, CacheEntry>,
    ttl_ms: i64,
    capacity: usize,
}

impl SnapshotCache {
    pub fn new(ttl_ms: i64, capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl_ms,
            capacity,
        }
    }

    /// The cached snapshot for a channel, or None if absent or expired.
    ///
    /// Reading never refreshes expiry.
    pub fn get(&self, channel: &GameId, now: i64) -> Option<&GameSnapshot> {
        self.entries
            .get(channel)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.snapshot)
    }

    /// Store a snapshot under its own id, resetting the entry's TTL.
    ///
    /// Overwriting an existing channel always succeeds; admitting a new
    /// channel requires capacity after expired entries are dropped.
    pub fn put(&mut self, snapshot: GameSnapshot, now: i64) -> Result<(), CacheError> {
        let channel = snapshot.id.clone();
        let expires_at = now + self.ttl_ms;

        if !self.entries.contains_key(&channel) && self.entries.len() >= self.capacity {
            self.sweep(now);
            if self.entries.len() >= self.capacity {
                return Err(CacheError::AtCapacity {
                    channel,
                    capacity: self.capacity,
                });
            }
        }

        self.entries.insert(
            channel,
            CacheEntry {
                snapshot,
                expires_at,
            },
        );
        Ok(())
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Number of entries, including any not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
