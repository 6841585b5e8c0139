//! Per-session state: the active vector index and the conversation memory.
//!
//! The original design here would be a pair of process-wide globals; instead
//! the state is an injected handle passed by `Arc` into request handlers, so
//! a single-user deployment uses one instance and per-session isolation is a
//! drop-in extension. Locks are never held across an await point.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::MemoryConfig;
use crate::index::VectorIndex;
use crate::memory::{ConversationMemory, Role};

pub struct SessionState {
    index: RwLock<Option<Arc<VectorIndex>>>,
    memory: RwLock<ConversationMemory>,
}

impl SessionState {
    pub fn new(memory_config: &MemoryConfig) -> Self {
        Self {
            index: RwLock::new(None),
            memory: RwLock::new(ConversationMemory::new(memory_config)),
        }
    }

    /// The active index, if one has been ingested or reloaded.
    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().clone()
    }

    /// Replaces the active index (a new upload or a cold-start reload).
    pub fn set_index(&self, index: Arc<VectorIndex>) {
        *self.index.write() = Some(index);
    }

    pub fn push_message(&self, role: Role, content: impl Into<String>) {
        self.memory.write().push(role, content);
    }

    /// Budgeted conversation history as prompt text.
    pub fn history_text(&self) -> String {
        self.memory.read().history_text()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.read().len()
    }

    pub fn last_assistant_message(&self) -> Option<String> {
        self.memory
            .read()
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
    }

    /// Clears both the index and the conversation (test isolation, mostly).
    pub fn reset(&self) {
        *self.index.write() = None;
        self.memory.write().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;

    #[test]
    fn starts_empty_and_resets() {
        let state = SessionState::new(&MemoryConfig::default());
        assert!(state.index().is_none());
        state.push_message(Role::User, "hi");
        state.set_index(Arc::new(VectorIndex {
            model: "m".into(),
            dims: 2,
            entries: vec![],
        }));
        assert!(state.index().is_some());
        assert_eq!(state.memory_len(), 1);

        state.reset();
        assert!(state.index().is_none());
        assert_eq!(state.memory_len(), 0);
    }
}
