//! Player registry owned by the broadcast hub
//!
//! This module tracks every logged-in session by name:
//! - Capacity enforcement against the configured player cap
//! - Per-session outbound queue handles used for fan-out
//! - Stale-removal protection when a name is reused
//!
//! The registry is plain data with no locking of its own. Exactly one task,
//! the hub, owns it, so every operation is serialized by construction.

use crate::error::ServerError;
use log::{debug, info, warn};
use shared::Frame;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A registered session as seen by the hub
///
/// Holds the producer side of the session's bounded outbound queue. The
/// session's send loop is the only consumer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Unique id assigned at login, never reused within a process
    pub id: u32,
    /// Claimed username, used as the registry key
    pub name: String,
    sender: mpsc::Sender<Frame>,
}

impl SessionHandle {
    pub fn new(id: u32, name: impl Into<String>, sender: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            name: name.into(),
            sender,
        }
    }

    /// Queues a frame without waiting
    ///
    /// Returns false when the frame was dropped: either the queue is full
    /// (the session is not keeping up) or the session is already gone.
    pub fn deliver(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue for {} is full, dropping frame", self.name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound queue for {} is closed", self.name);
                false
            }
        }
    }
}

/// All registered sessions plus the capacity limit
pub struct Registry {
    /// Sessions indexed by player name
    players: HashMap<String, SessionHandle>,
    /// Maximum number of registered sessions
    max_players: usize,
}

impl Registry {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            max_players,
        }
    }

    /// Registers a session under its name
    ///
    /// The capacity check counts the newcomer even when it reuses a name that
    /// is already registered. A reused name replaces the previous entry, which
    /// is returned; the replaced session keeps its connection but stops
    /// receiving broadcasts.
    pub fn insert(&mut self, handle: SessionHandle) -> Result<Option<SessionHandle>, ServerError> {
        if self.players.len() + 1 > self.max_players {
            return Err(ServerError::CapacityExceeded {
                name: handle.name,
                max: self.max_players,
            });
        }

        info!("Player {} registered (session {})", handle.name, handle.id);
        Ok(self.players.insert(handle.name.clone(), handle))
    }

    /// Removes a session if the entry under `name` still belongs to it
    ///
    /// Returns true if an entry was removed. A session that was replaced by a
    /// newer login with the same name cannot evict its replacement.
    pub fn remove(&mut self, name: &str, session_id: u32) -> bool {
        match self.players.get(name) {
            Some(handle) if handle.id == session_id => {
                self.players.remove(name);
                info!("Player {} unregistered (session {})", name, session_id);
                true
            }
            Some(handle) => {
                debug!(
                    "Ignoring removal of {} for session {}, entry belongs to session {}",
                    name, session_id, handle.id
                );
                false
            }
            None => false,
        }
    }

    /// Sends a frame to every registered session, returning how many got it
    pub fn fan_out(&self, frame: &Frame) -> usize {
        self.players
            .values()
            .filter(|handle| handle.deliver(frame.clone()))
            .count()
    }

    pub fn get(&self, name: &str) -> Option<&SessionHandle> {
        self.players.get(name)
    }

    /// Registered names in alphabetical order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u32, name: &str) -> (SessionHandle, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(4);
        (SessionHandle::new(id, name, tx), rx)
    }

    #[test]
    fn test_registry_creation() {
        let registry = Registry::new(5);
        assert_eq!(registry.max_players(), 5);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_insert_until_full() {
        let mut registry = Registry::new(2);
        let (alice, _rx1) = handle(1, "alice");
        let (bob, _rx2) = handle(2, "bob");
        let (carol, _rx3) = handle(3, "carol");

        assert!(registry.insert(alice).unwrap().is_none());
        assert!(registry.insert(bob).unwrap().is_none());

        let result = registry.insert(carol);
        assert!(matches!(
            result,
            Err(ServerError::CapacityExceeded { ref name, max: 2 }) if name == "carol"
        ));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("carol").is_none());
    }

    #[test]
    fn test_duplicate_name_replaces_entry() {
        let mut registry = Registry::new(3);
        let (first, _rx1) = handle(1, "steve");
        let (second, _rx2) = handle(2, "steve");

        registry.insert(first).unwrap();
        let replaced = registry.insert(second).unwrap();

        assert_eq!(replaced.map(|h| h.id), Some(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("steve").map(|h| h.id), Some(2));
    }

    #[test]
    fn test_duplicate_name_counts_against_capacity() {
        let mut registry = Registry::new(1);
        let (first, _rx1) = handle(1, "steve");
        let (second, _rx2) = handle(2, "steve");

        registry.insert(first).unwrap();
        assert!(registry.insert(second).is_err());
        assert_eq!(registry.get("steve").map(|h| h.id), Some(1));
    }

    #[test]
    fn test_stale_remove_is_ignored() {
        let mut registry = Registry::new(3);
        let (first, _rx1) = handle(1, "steve");
        let (second, _rx2) = handle(2, "steve");

        registry.insert(first).unwrap();
        registry.insert(second).unwrap();

        assert!(!registry.remove("steve", 1));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("steve", 2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let mut registry = Registry::new(1);
        assert!(!registry.remove("nobody", 7));
    }

    #[test]
    fn test_fan_out_reaches_everyone() {
        let mut registry = Registry::new(3);
        let (alice, mut rx1) = handle(1, "alice");
        let (bob, mut rx2) = handle(2, "bob");
        registry.insert(alice).unwrap();
        registry.insert(bob).unwrap();

        let frame = Frame::new(0x02, vec![1u8, 2, 3]);
        assert_eq!(registry.fan_out(&frame), 2);
        assert_eq!(rx1.try_recv().unwrap(), frame);
        assert_eq!(rx2.try_recv().unwrap(), frame);
    }

    #[test]
    fn test_fan_out_drops_for_full_queue_only() {
        let mut registry = Registry::new(2);
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast, mut fast_rx) = handle(2, "fast");
        registry.insert(SessionHandle::new(1, "slow", slow_tx)).unwrap();
        registry.insert(fast).unwrap();

        assert_eq!(registry.fan_out(&Frame::empty(0x02)), 2);
        // "slow" never drains, so its single slot stays occupied
        assert_eq!(registry.fan_out(&Frame::empty(0x03)), 1);

        assert_eq!(fast_rx.try_recv().unwrap().id, 0x02);
        assert_eq!(fast_rx.try_recv().unwrap().id, 0x03);
    }

    #[test]
    fn test_deliver_to_closed_session() {
        let (handle, rx) = handle(1, "gone");
        drop(rx);
        assert!(!handle.deliver(Frame::empty(0x02)));
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = Registry::new(3);
        let (c, _rx1) = handle(1, "carol");
        let (a, _rx2) = handle(2, "alice");
        registry.insert(c).unwrap();
        registry.insert(a).unwrap();
        assert_eq!(registry.names(), vec!["alice", "carol"]);
    }
}
