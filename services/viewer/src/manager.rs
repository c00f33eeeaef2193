//! Client transport manager
//!
//! A three-state machine — Disconnected, PushConnected, Polling — owning
//! exactly one active transport at any instant:
//!
//! - Disconnected: attempt a push connect. Success resets the failure
//!   streak, re-sends the subscription set, and requests an initial fetch.
//! - PushConnected: drive the socket. On error or close, the streak
//!   increments; under the attempt budget the manager backs off (base 1 s,
//!   doubling, capped at 5 s) and retries, at the budget it abandons push
//!   for the rest of the session.
//! - Polling: one initial fetch, then a continuous long-poll loop. A
//!   response resets the poll backoff and the next request goes out
//!   immediately; failures back off (base 1 s, doubling, capped at 30 s)
//!   and retry forever. Push is never re-probed.
//!
//! Teardown from any state cancels pending timers, closes or aborts the
//! active transport, and discards the local store. The outgoing transport
//! is always fully torn down before the next one starts, so deltas are
//! never applied from two transports at once.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::game::{GameDelta, GameSnapshot};
use types::ids::{GameId, SessionId};
use types::messages::{ClientMessage, ServerMessage};

use crate::backoff::Backoff;
use crate::store::{ApplyOutcome, GameStore};
use crate::transport::{PollTransport, PushConnector, PushSession};

/// The manager's transport states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    PushConnected,
    Polling,
}

/// Backoff and budget knobs. Defaults are the protocol contract; tests
/// shrink the durations.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub push_backoff_base: Duration,
    pub push_backoff_cap: Duration,
    /// Consecutive push failures tolerated before degrading to polling.
    pub push_attempt_budget: u32,
    pub poll_backoff_base: Duration,
    pub poll_backoff_cap: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            push_backoff_base: Duration::from_secs(1),
            push_backoff_cap: Duration::from_secs(5),
            push_attempt_budget: 3,
            poll_backoff_base: Duration::from_secs(1),
            poll_backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Requests from the presentation layer into the manager.
#[derive(Debug, Clone)]
enum Command {
    Subscribe(Vec<GameId>),
    Unsubscribe(Vec<GameId>),
    Shutdown,
}

/// What the manager reports outward.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Transport(TransportState),
    GameUpdated(GameSnapshot),
    GameRemoved(GameId),
}

/// Cloneable handle for driving a running manager.
#[derive(Clone)]
pub struct ViewerHandle {
    commands: mpsc::Sender<Command>,
}

impl ViewerHandle {
    /// Subscribe to games. The local set updates immediately; an active
    /// push transport is notified in-band.
    pub async fn subscribe(&self, game_ids: Vec<GameId>) {
        let _ = self.commands.send(Command::Subscribe(game_ids)).await;
    }

    /// Unsubscribe from games; they disappear from the local store at once
    /// even though server-side fan-out removal is eventually consistent.
    pub async fn unsubscribe(&self, game_ids: Vec<GameId>) {
        let _ = self.commands.send(Command::Unsubscribe(game_ids)).await;
    }

    /// Tear the session down.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

enum PushOutcome {
    Shutdown,
    Failed,
}

#[derive(PartialEq)]
enum SleepOutcome {
    Completed,
    Shutdown,
}

enum PollResponse {
    Initial(Vec<GameSnapshot>),
    Batch(Vec<GameDelta>),
}

pub struct TransportManager<P, L> {
    push: P,
    poll: Arc<L>,
    config: ManagerConfig,
    client_id: SessionId,
    subscriptions: BTreeSet<GameId>,
    store: GameStore,
    state: TransportState,
    /// Set whenever the subscription set gains games whose snapshots the
    /// store does not hold; cleared by a covering initial fetch.
    need_initial: bool,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<ViewerEvent>,
}

impl<P, L> TransportManager<P, L>
where
    P: PushConnector,
    L: PollTransport + 'static,
{
    pub fn new(
        push: P,
        poll: L,
        initial_subscriptions: Vec<GameId>,
        config: ManagerConfig,
    ) -> (Self, ViewerHandle, mpsc::UnboundedReceiver<ViewerEvent>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Self {
            push,
            poll: Arc::new(poll),
            config,
            client_id: SessionId::new(),
            subscriptions: initial_subscriptions.into_iter().collect(),
            store: GameStore::new(),
            state: TransportState::Disconnected,
            need_initial: true,
            commands: command_rx,
            events: event_tx,
        };
        let handle = ViewerHandle {
            commands: command_tx,
        };
        (manager, handle, event_rx)
    }

    /// Run the session until teardown.
    pub async fn run(mut self) {
        info!(client = %self.client_id, "transport manager starting");
        let mut backoff = Backoff::new(self.config.push_backoff_base, self.config.push_backoff_cap);

        loop {
            let retry_delay = match self.push.connect().await {
                Ok(session) => {
                    backoff.reset();
                    self.set_state(TransportState::PushConnected);
                    match self.drive_push(session).await {
                        PushOutcome::Shutdown => return self.teardown(),
                        PushOutcome::Failed => backoff.next_delay(),
                    }
                }
                Err(error) => {
                    let delay = backoff.next_delay();
                    warn!(%error, failures = backoff.failures(), "push connect failed");
                    delay
                }
            };

            if backoff.failures() >= self.config.push_attempt_budget {
                info!(
                    failures = backoff.failures(),
                    "push abandoned for this session; degrading to polling"
                );
                self.set_state(TransportState::Polling);
                self.run_poll_loop().await;
                return self.teardown();
            }

            self.set_state(TransportState::Disconnected);
            debug!(delay = ?retry_delay, "push reconnect scheduled");
            if self.interruptible_sleep(retry_delay).await == SleepOutcome::Shutdown {
                return self.teardown();
            }
        }
    }

    /// Drive an established push connection until it fails, closes, or the
    /// session shuts down.
    async fn drive_push(&mut self, mut session: Box<dyn PushSession>) -> PushOutcome {
        // Re-send the subscription set on every new connection; the relay
        // holds no state across reconnects. Then sync the store.
        if !self.subscriptions.is_empty() {
            let game_ids: Vec<GameId> = self.subscriptions.iter().cloned().collect();
            let subscribe = session
                .send(ClientMessage::Subscribe {
                    game_ids: game_ids.clone(),
                })
                .await;
            let initial = match subscribe {
                Ok(()) => session.send(ClientMessage::Initial { game_ids }).await,
                Err(error) => Err(error),
            };
            if let Err(error) = initial {
                warn!(%error, "push handshake failed");
                session.close().await;
                return PushOutcome::Failed;
            }
        }

        loop {
            tokio::select! {
                incoming = session.next() => match incoming {
                    Ok(Some(message)) => self.handle_server_message(message),
                    Ok(None) => {
                        debug!("push transport closed");
                        session.close().await;
                        return PushOutcome::Failed;
                    }
                    Err(error) => {
                        warn!(%error, "push transport error");
                        session.close().await;
                        return PushOutcome::Failed;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe(game_ids)) => {
                        let fresh = self.apply_subscribe(game_ids);
                        if !fresh.is_empty() {
                            let sent = match session
                                .send(ClientMessage::Subscribe { game_ids: fresh.clone() })
                                .await
                            {
                                Ok(()) => {
                                    session.send(ClientMessage::Initial { game_ids: fresh }).await
                                }
                                Err(error) => Err(error),
                            };
                            if let Err(error) = sent {
                                warn!(%error, "push subscribe failed");
                                session.close().await;
                                return PushOutcome::Failed;
                            }
                        }
                    }
                    Some(Command::Unsubscribe(game_ids)) => {
                        let removed = self.apply_unsubscribe(game_ids);
                        if !removed.is_empty() {
                            if let Err(error) = session
                                .send(ClientMessage::Unsubscribe { game_ids: removed })
                                .await
                            {
                                warn!(%error, "push unsubscribe failed");
                                session.close().await;
                                return PushOutcome::Failed;
                            }
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        session.close().await;
                        return PushOutcome::Shutdown;
                    }
                },
            }
        }
    }

    /// The continuous long-poll loop. Returns only on shutdown.
    async fn run_poll_loop(&mut self) {
        let mut backoff = Backoff::new(self.config.poll_backoff_base, self.config.poll_backoff_cap);
        // A session that never achieved push still needs its entities.
        self.need_initial = true;

        loop {
            if self.subscriptions.is_empty() {
                match self.commands.recv().await {
                    Some(Command::Subscribe(game_ids)) => {
                        self.apply_subscribe(game_ids);
                        continue;
                    }
                    Some(Command::Unsubscribe(game_ids)) => {
                        self.apply_unsubscribe(game_ids);
                        continue;
                    }
                    Some(Command::Shutdown) | None => return,
                }
            }

            let requested: Vec<GameId> = self.subscriptions.iter().cloned().collect();
            let requested_set = self.subscriptions.clone();
            let fetch_initial = self.need_initial;
            let poll = self.poll.clone();
            let client_id = self.client_id;
            // The request runs as a task so subscription changes never
            // cancel an in-flight poll (its batch would be lost); only
            // shutdown aborts it.
            let mut request = tokio::spawn(async move {
                if fetch_initial {
                    poll.fetch_initial(&requested).await.map(PollResponse::Initial)
                } else {
                    poll.poll(client_id, &requested).await.map(PollResponse::Batch)
                }
            });

            let joined = loop {
                tokio::select! {
                    joined = &mut request => break Some(joined),
                    command = self.commands.recv() => match command {
                        Some(Command::Subscribe(game_ids)) => {
                            self.apply_subscribe(game_ids);
                        }
                        Some(Command::Unsubscribe(game_ids)) => {
                            self.apply_unsubscribe(game_ids);
                        }
                        Some(Command::Shutdown) | None => {
                            request.abort();
                            break None;
                        }
                    },
                }
            };
            let Some(joined) = joined else { return };

            match joined {
                Ok(Ok(PollResponse::Initial(snapshots))) => {
                    backoff.reset();
                    // Covered unless new games arrived while in flight.
                    self.need_initial = self
                        .subscriptions
                        .iter()
                        .any(|id| !requested_set.contains(id));
                    self.handle_server_message(ServerMessage::Initial { data: snapshots });
                }
                Ok(Ok(PollResponse::Batch(deltas))) => {
                    backoff.reset();
                    for delta in deltas {
                        self.apply_delta(delta);
                    }
                }
                Ok(Err(error)) => {
                    let delay = backoff.next_delay();
                    warn!(%error, ?delay, failures = backoff.failures(), "poll failed; backing off");
                    if self.interruptible_sleep(delay).await == SleepOutcome::Shutdown {
                        return;
                    }
                }
                Err(join_error) => {
                    let delay = backoff.next_delay();
                    warn!(%join_error, ?delay, "poll task failed; backing off");
                    if self.interruptible_sleep(delay).await == SleepOutcome::Shutdown {
                        return;
                    }
                }
            }
        }
    }

    /// Sleep that commands can interrupt; shutdown cancels the timer.
    async fn interruptible_sleep(&mut self, delay: Duration) -> SleepOutcome {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return SleepOutcome::Completed,
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe(game_ids)) => {
                        self.apply_subscribe(game_ids);
                    }
                    Some(Command::Unsubscribe(game_ids)) => {
                        self.apply_unsubscribe(game_ids);
                    }
                    Some(Command::Shutdown) | None => return SleepOutcome::Shutdown,
                },
            }
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Initial { data } => {
                for snapshot in data {
                    // An unsubscribe may have raced the response; only
                    // wanted games enter the store.
                    if self.subscriptions.contains(&snapshot.id) {
                        self.store.insert(snapshot.clone());
                        self.emit(ViewerEvent::GameUpdated(snapshot));
                    }
                }
            }
            ServerMessage::Delta { data } => self.apply_delta(data),
            ServerMessage::Batch { deltas } => {
                for delta in deltas {
                    self.apply_delta(delta);
                }
            }
            ServerMessage::Error { message } => {
                warn!(message, "relay reported a request error");
            }
        }
    }

    fn apply_delta(&mut self, delta: GameDelta) {
        match self.store.apply_delta(&delta) {
            ApplyOutcome::Applied => {
                if let Some(game) = self.store.get(&delta.id) {
                    self.emit(ViewerEvent::GameUpdated(game.clone()));
                }
            }
            ApplyOutcome::UnknownId => {
                debug!(game = %delta.id, "delta for unknown game ignored");
            }
            ApplyOutcome::Stale => {
                debug!(game = %delta.id, "stale delta ignored");
            }
        }
    }

    /// Mutate the local set immediately; returns the genuinely new games.
    fn apply_subscribe(&mut self, game_ids: Vec<GameId>) -> Vec<GameId> {
        let mut fresh = Vec::new();
        for id in game_ids {
            if self.subscriptions.insert(id.clone()) {
                fresh.push(id);
            }
        }
        if !fresh.is_empty() {
            self.need_initial = true;
        }
        fresh
    }

    /// Mutate the local set and evict the games from the store.
    fn apply_unsubscribe(&mut self, game_ids: Vec<GameId>) -> Vec<GameId> {
        let mut removed = Vec::new();
        for id in game_ids {
            if self.subscriptions.remove(&id) {
                self.store.remove(&id);
                self.emit(ViewerEvent::GameRemoved(id.clone()));
                removed.push(id);
            }
        }
        removed
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            self.state = state;
            self.emit(ViewerEvent::Transport(state));
        }
    }

    fn emit(&self, event: ViewerEvent) {
        let _ = self.events.send(event);
    }

    fn teardown(&mut self) {
        self.store.clear();
        self.set_state(TransportState::Disconnected);
        info!(client = %self.client_id, "session torn down");
    }
}
