//! Session manager.
//!
//! Tracks connected observers and fans frames out to them. Each session owns
//! a bounded outbound queue drained by its transport task; the world actor
//! only ever does non-blocking `try_send`. A session whose queue is full is
//! disconnected rather than allowed to stall the tick or other sessions.

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Serialized event, shared by every session it is sent to.
pub type Frame = Arc<str>;

/// Identifies a connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// One connected observer. Holds no authority over the world.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Diagnostics only.
    pub joined_at: Instant,
    /// `None` for in-process subscribers such as protocol bridges.
    pub peer: Option<SocketAddr>,
    outbox: mpsc::Sender<Frame>,
}

/// Why a session was dropped during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Backpressure,
    Closed,
}

#[derive(Debug, Default)]
pub struct SessionManager {
    next_id: u64,
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionManager {
    /// Registers a session. `initial` is queued before the session is visible
    /// to any broadcast, so it is always the first frame the session sees.
    pub fn connect(
        &mut self,
        outbox: mpsc::Sender<Frame>,
        peer: Option<SocketAddr>,
        now: Instant,
        initial: Frame,
    ) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(
            id,
            Session {
                id,
                joined_at: now,
                peer,
                outbox,
            },
        );
        info!(session = ?id, peer = ?peer, sessions = self.sessions.len(), "Session joined");
        // Nothing else can reach the outbox before this frame. If the transport
        // is already gone the session is evicted and the later leave is a no-op.
        if let Err(reason) = self.send_to(id, initial) {
            debug!(session = ?id, ?reason, "Initial state not delivered");
        }
        id
    }

    /// Drops bookkeeping for a session. Returns `false` if it was already gone.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(session) => {
                info!(
                    session = ?id,
                    connected_for = ?session.joined_at.elapsed(),
                    sessions = self.sessions.len(),
                    "Session left"
                );
                true
            }
            None => false,
        }
    }

    pub fn list_active(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queues `frame` for one session.
    pub fn send_to(&mut self, id: SessionId, frame: Frame) -> Result<(), DropReason> {
        let Some(session) = self.sessions.get(&id) else {
            return Err(DropReason::Closed);
        };
        match session.outbox.try_send(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                let reason = drop_reason(&e);
                self.evict(id, reason);
                Err(reason)
            }
        }
    }

    /// Queues the same frame for every active session. Sessions that cannot
    /// take it are evicted and returned; delivery is not retried.
    pub fn broadcast(&mut self, frame: &Frame) -> Vec<(SessionId, DropReason)> {
        let mut dropped = Vec::new();
        for session in self.sessions.values() {
            if let Err(e) = session.outbox.try_send(Arc::clone(frame)) {
                dropped.push((session.id, drop_reason(&e)));
            }
        }
        for &(id, reason) in &dropped {
            self.evict(id, reason);
        }
        dropped
    }

    fn evict(&mut self, id: SessionId, reason: DropReason) {
        if self.sessions.remove(&id).is_some() {
            match reason {
                DropReason::Backpressure => {
                    warn!(session = ?id, "Session outbox full, disconnecting")
                }
                DropReason::Closed => debug!(session = ?id, "Session outbox closed"),
            }
        }
    }
}

fn drop_reason<T>(e: &TrySendError<T>) -> DropReason {
    match e {
        TrySendError::Full(_) => DropReason::Backpressure,
        TrySendError::Closed(_) => DropReason::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[test]
    fn initial_frame_precedes_broadcasts() {
        let mut sessions = SessionManager::default();
        let (tx, mut rx) = mpsc::channel(8);
        sessions.connect(tx, None, Instant::now(), frame("initial"));
        sessions.broadcast(&frame("tick-1"));
        sessions.broadcast(&frame("tick-2"));

        assert_eq!(&*rx.try_recv().unwrap(), "initial");
        assert_eq!(&*rx.try_recv().unwrap(), "tick-1");
        assert_eq!(&*rx.try_recv().unwrap(), "tick-2");
    }

    #[test]
    fn broadcast_reaches_every_session_with_one_payload() {
        let mut sessions = SessionManager::default();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        sessions.connect(tx_a, None, Instant::now(), frame("i"));
        sessions.connect(tx_b, None, Instant::now(), frame("i"));
        let _ = (rx_a.try_recv(), rx_b.try_recv());

        let payload = frame("state");
        assert!(sessions.broadcast(&payload).is_empty());
        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn slow_session_is_dropped_without_affecting_others() {
        let mut sessions = SessionManager::default();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = sessions.connect(slow_tx, None, Instant::now(), frame("i"));
        let fast = sessions.connect(fast_tx, None, Instant::now(), frame("i"));
        fast_rx.try_recv().unwrap();

        let dropped = sessions.broadcast(&frame("state"));
        assert_eq!(dropped, vec![(slow, DropReason::Backpressure)]);
        assert!(!sessions.contains(slow));
        assert!(sessions.contains(fast));
        assert_eq!(&*fast_rx.try_recv().unwrap(), "state");
    }

    #[test]
    fn closed_session_is_dropped() {
        let mut sessions = SessionManager::default();
        let (tx, rx) = mpsc::channel(4);
        let id = sessions.connect(tx, None, Instant::now(), frame("i"));
        drop(rx);
        assert_eq!(sessions.broadcast(&frame("x")), vec![(id, DropReason::Closed)]);
        assert!(sessions.is_empty());
    }

    #[test]
    fn send_to_targets_one_session() {
        let mut sessions = SessionManager::default();
        let (tx_a, mut rx_a) = mpsc::channel(2);
        let (tx_b, mut rx_b) = mpsc::channel(2);
        let a = sessions.connect(tx_a, None, Instant::now(), frame("i"));
        sessions.connect(tx_b, None, Instant::now(), frame("i"));
        let _ = (rx_a.try_recv(), rx_b.try_recv());

        sessions.send_to(a, frame("only-a")).unwrap();
        assert_eq!(&*rx_a.try_recv().unwrap(), "only-a");
        assert!(rx_b.try_recv().is_err());
        assert_eq!(
            sessions.send_to(SessionId(99), frame("x")),
            Err(DropReason::Closed)
        );
    }

    #[test]
    fn session_gone_before_initial_state_is_evicted() {
        let mut sessions = SessionManager::default();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let id = sessions.connect(tx, None, Instant::now(), frame("initial"));
        assert!(!sessions.contains(id));
        assert!(!sessions.disconnect(id));
    }

    #[test]
    fn disconnect_is_idempotent_and_ids_unique() {
        let mut sessions = SessionManager::default();
        let (tx, _rx) = mpsc::channel(4);
        let a = sessions.connect(tx.clone(), None, Instant::now(), frame("i"));
        let b = sessions.connect(tx, None, Instant::now(), frame("i"));
        assert_ne!(a, b);
        assert!(sessions.disconnect(a));
        assert!(!sessions.disconnect(a));
        assert_eq!(sessions.list_active().map(|s| s.id).collect::<Vec<_>>(), vec![b]);
    }
}
