//! Subscription registry: who wants which channel
//!
//! Tracks, per session, the set of channels it is interested in, plus an
//! inverse interest index so fan-out answers "which sessions want channel
//! C" in time proportional to the interested set rather than the total
//! session count. State is keyed by opaque `SessionId`s, never by
//! connection handles, so teardown is a map deletion.
//!
//! Uses BTreeMap/BTreeSet for deterministic iteration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use types::ids::{GameId, SessionId};
use types::messages::ServerMessage;

use crate::mailbox::PollMailbox;

/// Errors returned to the requesting session only; registry state for
/// other sessions is never affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("malformed game id list")]
    MalformedGameIds,

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("subscription limit ({0}) reached")]
    SubscriptionLimit(usize),
}

/// Delivery endpoint for one session.
#[derive(Debug, Clone)]
pub enum SessionSink {
    /// Bounded outbound queue drained by the session's WebSocket writer.
    Push(mpsc::Sender<ServerMessage>),
    /// Mailbox drained by the session's long-poll requests.
    Poll(Arc<PollMailbox>),
}

#[derive(Debug)]
struct SessionEntry {
    sink: SessionSink,
    subscriptions: BTreeSet<GameId>,
}

/// Registry of connected sessions and their channel interests.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    sessions: BTreeMap<SessionId, SessionEntry>,
    interest: BTreeMap<GameId, BTreeSet<SessionId>>,
    max_subscriptions_per_session: usize,
}

impl SubscriptionRegistry {
    pub fn new(max_subscriptions_per_session: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            interest: BTreeMap::new(),
            max_subscriptions_per_session,
        }
    }

    /// Register a session with its delivery sink.
    ///
    /// A session id that is already connected is replaced wholesale; its
    /// previous subscription set is discarded (no persistence across
    /// reconnects — the client re-sends its set on every new connection).
    pub fn connect(&mut self, session: SessionId, sink: SessionSink) {
        self.drop_session(session);
        self.sessions.insert(
            session,
            SessionEntry {
                sink,
                subscriptions: BTreeSet::new(),
            },
        );
    }

    /// Add channels to a session's subscription set. Idempotent.
    pub fn join(&mut self, session: SessionId, game_ids: &[GameId]) -> Result<(), RegistryError> {
        validate_game_ids(game_ids)?;
        let limit = self.max_subscriptions_per_session;
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(RegistryError::UnknownSession(session))?;

        let new: BTreeSet<&GameId> = game_ids
            .iter()
            .filter(|id| !entry.subscriptions.contains(*id))
            .collect();
        if entry.subscriptions.len() + new.len() > limit {
            return Err(RegistryError::SubscriptionLimit(limit));
        }

        for id in new {
            entry.subscriptions.insert(id.clone());
            self.interest.entry(id.clone()).or_default().insert(session);
        }
        Ok(())
    }

    /// Remove channels from a session's subscription set.
    ///
    /// Leaving a channel the session never joined is a no-op.
    pub fn leave(&mut self, session: SessionId, game_ids: &[GameId]) -> Result<(), RegistryError> {
        validate_game_ids(game_ids)?;
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(RegistryError::UnknownSession(session))?;

        for id in game_ids {
            if entry.subscriptions.remove(id) {
                remove_interest(&mut self.interest, id, session);
            }
        }
        Ok(())
    }

    /// Remove a session from every channel's interest group and discard
    /// its subscription set. Returns false if the session was unknown.
    pub fn drop_session(&mut self, session: SessionId) -> bool {
        let Some(entry) = self.sessions.remove(&session) else {
            return false;
        };
        for id in &entry.subscriptions {
            remove_interest(&mut self.interest, id, session);
        }
        true
    }

    /// Sinks of every session interested in a channel.
    ///
    /// Cost is proportional to the interested set; fan-out runs this on
    /// every publication.
    pub fn interested(&self, channel: &GameId) -> Vec<(SessionId, SessionSink)> {
        let Some(sessions) = self.interest.get(channel) else {
            return Vec::new();
        };
        sessions
            .iter()
            .filter_map(|id| {
                self.sessions
                    .get(id)
                    .map(|entry| (*id, entry.sink.clone()))
            })
            .collect()
    }

    /// A session's current subscription set.
    pub fn subscriptions(&self, session: SessionId) -> Option<&BTreeSet<GameId>> {
        self.sessions.get(&session).map(|e| &e.subscriptions)
    }

    /// Register or refresh a polling session.
    ///
    /// The request's game list is authoritative: channels not in it are
    /// left, new ones joined. Returns the session's mailbox and whether
    /// the session was newly created.
    pub fn ensure_poll_session(
        &mut self,
        session: SessionId,
        game_ids: &[GameId],
        mailbox_capacity: usize,
        now: i64,
    ) -> Result<(Arc<PollMailbox>, bool), RegistryError> {
        validate_game_ids(game_ids)?;

        let existing = match self.sessions.get(&session) {
            Some(SessionEntry {
                sink: SessionSink::Poll(mailbox),
                ..
            }) => Some(mailbox.clone()),
            // A push session reusing the id is replaced below; ids are
            // client-generated and a client runs one transport at a time.
            Some(_) => None,
            None => None,
        };

        let (mailbox, created) = match existing {
            Some(mailbox) => (mailbox, false),
            None => {
                let mailbox = Arc::new(PollMailbox::new(mailbox_capacity, now));
                self.connect(session, SessionSink::Poll(mailbox.clone()));
                (mailbox, true)
            }
        };

        let current = self
            .subscriptions(session)
            .cloned()
            .unwrap_or_default();
        let wanted: BTreeSet<GameId> = game_ids.iter().cloned().collect();

        let stale: Vec<GameId> = current.difference(&wanted).cloned().collect();
        if !stale.is_empty() {
            self.leave(session, &stale)?;
        }
        let fresh: Vec<GameId> = wanted.difference(&current).cloned().collect();
        if !fresh.is_empty() {
            self.join(session, &fresh)?;
        }

        Ok((mailbox, created))
    }

    /// Drop poll sessions whose mailbox has not been polled within
    /// `idle_ms`. Returns the sessions removed.
    pub fn sweep_idle_polls(&mut self, now: i64, idle_ms: i64) -> Vec<SessionId> {
        let idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, entry)| match &entry.sink {
                SessionSink::Poll(mailbox) => mailbox.is_idle(now, idle_ms),
                SessionSink::Push(_) => false,
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &idle {
            self.drop_session(*id);
        }
        idle
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn validate_game_ids(game_ids: &[GameId]) -> Result<(), RegistryError> {
    if game_ids.is_empty() || game_ids.iter().any(|id| !id.is_valid()) {
        return Err(RegistryError::MalformedGameIds);
    }
    Ok(())
}

fn remove_interest(
    interest: &mut BTreeMap<GameId, BTreeSet<SessionId>>,
    channel: &GameId,
    session: SessionId,
) {
    if let Some(group) = interest.get_mut(channel) {
        group.remove(&session);
        if group.is_empty() {
            interest.remove(channel);
        }
    }
}
