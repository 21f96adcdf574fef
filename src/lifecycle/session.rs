//! SessionStore - explicit registry of lifecycle contexts, one per session

use crate::models::LifecycleContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// Latest context per session id, shared between managers
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, LifecycleContext>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the context for its session
    pub fn put(&self, context: LifecycleContext) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(context.session_id.clone(), context);
    }

    pub fn get(&self, session_id: &str) -> Option<LifecycleContext> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<LifecycleContext> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(id: &str, query: &str) -> LifecycleContext {
        let mut ctx = LifecycleContext::new(query);
        ctx.session_id = id.to_string();
        ctx
    }

    #[test]
    fn test_one_context_per_session() {
        let store = SessionStore::new();
        store.put(context("session_a", "first"));
        store.put(context("session_b", "other"));
        store.put(context("session_a", "second"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("session_a").unwrap().user_query, "second");
        assert_eq!(store.session_ids(), vec!["session_a", "session_b"]);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.put(context("session_a", "q"));
        assert!(store.remove("session_a").is_some());
        assert!(store.get("session_a").is_none());
        assert!(store.is_empty());
    }
}
