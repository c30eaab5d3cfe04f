//! Registry of sessions currently live inside the worker.
//!
//! A cache of worker-side state, not a source of truth for ownership.
//! Mutated only by the command channel's success path for connect/disconnect
//! and cleared atomically on supervisor stop or crash.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared set of session ids believed attached inside the worker.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashSet<i64>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session as attached.
    pub fn insert(&self, session_id: i64) {
        self.inner.lock().expect("registry poisoned").insert(session_id);
    }

    /// Record a session as detached.
    pub fn remove(&self, session_id: i64) {
        self.inner.lock().expect("registry poisoned").remove(&session_id);
    }

    /// Whether a session is believed attached.
    pub fn contains(&self, session_id: i64) -> bool {
        self.inner.lock().expect("registry poisoned").contains(&session_id)
    }

    /// Drop every entry. Called on worker stop or crash.
    pub fn clear(&self) {
        self.inner.lock().expect("registry poisoned").clear();
    }

    /// Snapshot of the current entries.
    pub fn snapshot(&self) -> Vec<i64> {
        self.inner.lock().expect("registry poisoned").iter().copied().collect()
    }

    /// Number of attached sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry poisoned").len()
    }

    /// Whether no sessions are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_clear() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        registry.insert(1);
        registry.insert(2);
        registry.insert(2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(1));

        registry.remove(1);
        assert!(!registry.contains(1));
        assert!(registry.contains(2));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let clone = registry.clone();
        clone.insert(7);
        assert!(registry.contains(7));
    }
}
