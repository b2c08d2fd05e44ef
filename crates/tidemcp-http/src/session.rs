//! Session registry for SSE connections.
//!
//! Every open subscribe stream owns one entry: a bounded outbound queue of
//! encoded response frames. The registry is the only place sessions live;
//! callers get explicit create / lookup / deliver / remove operations and
//! never iterate the map themselves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tidemcp_core::SessionId;
use tidemcp_transport_traits::AtomicMetrics;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// One encoded response, shared between sessions on broadcast.
pub(crate) type Frame = Arc<str>;

/// Why a frame could not be handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryError {
    /// No session with that id is registered.
    NotFound,
    /// The session's outbound queue is full.
    Full,
}

/// Counts from one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BroadcastOutcome {
    pub(crate) delivered: usize,
    pub(crate) skipped: usize,
}

#[derive(Debug, Default)]
struct Sessions {
    map: HashMap<SessionId, mpsc::Sender<Frame>>,
    /// Set by `close`; no session is registered afterwards.
    closed: bool,
}

/// Map of session id to the sending half of its outbound queue.
#[derive(Clone, Debug)]
pub(crate) struct SessionRegistry {
    sessions: Arc<RwLock<Sessions>>,
    metrics: Arc<AtomicMetrics>,
}

impl SessionRegistry {
    pub(crate) fn new(metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Sessions::default())),
            metrics,
        }
    }

    /// Registers a fresh session and returns its id and outbound receiver, or
    /// `None` once the registry is closed.
    pub(crate) fn create(&self, capacity: usize) -> Option<(SessionId, mpsc::Receiver<Frame>)> {
        let session_id = SessionId::generate();
        let (tx, rx) = mpsc::channel(capacity.max(1));

        {
            let mut sessions = self.sessions.write();
            if sessions.closed {
                return None;
            }
            sessions.map.insert(session_id.clone(), tx);
        }
        AtomicMetrics::incr(&self.metrics.active_sessions);

        debug!(session_id = %session_id, "Created SSE session");
        Some((session_id, rx))
    }

    pub(crate) fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.read().map.contains_key(session_id)
    }

    /// Deregisters a session. Returns whether it was registered.
    pub(crate) fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().map.remove(session_id).is_some();
        if removed {
            AtomicMetrics::decr(&self.metrics.active_sessions);
            debug!(session_id = %session_id, "Removed SSE session");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().map.len()
    }

    /// Drops every session, ending their event streams, and refuses new ones.
    /// Returns how many sessions there were.
    pub(crate) fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write();
            sessions.closed = true;
            sessions.map.drain().collect()
        };
        for _ in &drained {
            AtomicMetrics::decr(&self.metrics.active_sessions);
        }
        drained.len()
    }

    /// Hands `frame` to one session without waiting.
    pub(crate) fn deliver(&self, session_id: &SessionId, frame: Frame) -> Result<(), DeliveryError> {
        let result = {
            let sessions = self.sessions.read();
            let tx = sessions.map.get(session_id).ok_or(DeliveryError::NotFound)?;
            tx.try_send(frame)
        };

        match result {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Full),
            Err(TrySendError::Closed(_)) => {
                // Stream already gone; its cleanup just hasn't run yet
                self.remove(session_id);
                Err(DeliveryError::NotFound)
            }
        }
    }

    /// Hands `frame` to every session without waiting. A full queue is skipped.
    pub(crate) fn broadcast(&self, frame: &Frame) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut gone = Vec::new();

        {
            let sessions = self.sessions.read();
            for (session_id, tx) in &sessions.map {
                match tx.try_send(frame.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(session_id = %session_id, "Session queue full, skipping broadcast");
                        outcome.skipped += 1;
                    }
                    Err(TrySendError::Closed(_)) => gone.push(session_id.clone()),
                }
            }
        }

        for session_id in gone {
            self.remove(&session_id);
        }
        outcome
    }
}
