use crate::peer::actor::SessionHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live sessions keyed by counterpart id.
///
/// Lookup and creation happen under one lock, so concurrent messages for
/// an unseen peer never produce two sessions.
pub struct SessionRegistry<H: Clone = SessionHandle> {
    sessions: Mutex<HashMap<String, H>>,
    generation: AtomicU64,
}

impl<H: Clone> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> SessionRegistry<H> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the session for `peer_id`, creating it with the next
    /// generation number when absent. The flag is true for a new entry.
    pub fn get_or_create(&self, peer_id: &str, create: impl FnOnce(u64) -> H) -> (H, bool) {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(peer_id) {
            return (existing.clone(), false);
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = create(generation);
        sessions.insert(peer_id.to_string(), handle.clone());
        (handle, true)
    }

    pub fn get(&self, peer_id: &str) -> Option<H> {
        self.sessions.lock().get(peer_id).cloned()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.sessions.lock().contains_key(peer_id)
    }

    pub fn remove(&self, peer_id: &str) -> Option<H> {
        self.sessions.lock().remove(peer_id)
    }

    /// Removes the entry only while `pred` holds for it, so an exiting
    /// session cannot evict its own replacement.
    pub fn remove_if(&self, peer_id: &str, pred: impl FnOnce(&H) -> bool) -> Option<H> {
        let mut sessions = self.sessions.lock();
        match sessions.get(peer_id) {
            Some(handle) if pred(handle) => sessions.remove(peer_id),
            _ => None,
        }
    }

    pub fn all(&self) -> Vec<H> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn drain(&self) -> Vec<H> {
        self.sessions.lock().drain().map(|(_, h)| h).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
