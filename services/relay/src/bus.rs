//! Upstream bus seam
//!
//! The relay consumes full-state publications from a pub/sub substrate it
//! does not own. The substrate contract, which the relay inherits rather
//! than enforces: messages published on one channel arrive in publish
//! order (FIFO per channel) at every subscriber.
//!
//! `MemoryBus` is the in-process implementation wired between the demo
//! publisher and the relay; a networked substrate plugs in behind the same
//! trait.

use async_trait::async_trait;
use std::collections::BTreeSet;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;
use types::ids::GameId;

/// One full-state publication on a named channel.
#[derive(Debug, Clone)]
pub struct Publication {
    pub channel: GameId,
    pub payload: Vec<u8>,
}

/// Errors from the bus substrate.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus has no active subscribers")]
    NoSubscribers,

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// Subscription half of the bus seam.
///
/// Implementations must deliver per-channel FIFO; the returned stream ends
/// when the bus shuts down.
#[async_trait]
pub trait UpstreamBus: Send + Sync {
    /// Subscribe to the given channels; an empty list means all channels.
    async fn subscribe(&self, channels: &[GameId]) -> Result<mpsc::Receiver<Publication>, BusError>;
}

/// In-process bus backed by a tokio broadcast channel.
///
/// A single broadcast queue totally orders all publications, which gives
/// per-channel FIFO trivially.
pub struct MemoryBus {
    tx: broadcast::Sender<Publication>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Handle for the publishing side.
    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            tx: self.tx.clone(),
        }
    }
}

#[async_trait]
impl UpstreamBus for MemoryBus {
    async fn subscribe(&self, channels: &[GameId]) -> Result<mpsc::Receiver<Publication>, BusError> {
        let mut rx = self.tx.subscribe();
        let filter: BTreeSet<GameId> = channels.iter().cloned().collect();
        let (out_tx, out_rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(publication) => {
                        if !filter.is_empty() && !filter.contains(&publication.channel) {
                            continue;
                        }
                        if out_tx.send(publication).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "bus subscriber lagged; publications skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(out_rx)
    }
}

/// Publishing handle onto a `MemoryBus`.
#[derive(Clone)]
pub struct BusPublisher {
    tx: broadcast::Sender<Publication>,
}

impl BusPublisher {
    /// Publish a payload on a channel.
    ///
    /// Fails when nothing is subscribed, mirroring a disconnected
    /// substrate; publishers count and log this rather than aborting.
    pub fn publish(&self, channel: GameId, payload: Vec<u8>) -> Result<(), BusError> {
        self.tx
            .send(Publication { channel, payload })
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers)
    }
}
