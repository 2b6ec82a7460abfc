//! In-process conversation store backed by a concurrent map.
//!
//! Threads live for the lifetime of the process. Used by the HTTP server
//! and tests; a durable store would implement the same trait.

use dashmap::DashMap;
use uuid::Uuid;

use triage_core::store::ConversationStore;
use triage_types::chat::ConversationTurn;
use triage_types::error::RepositoryError;

#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    threads: DashMap<Uuid, Vec<ConversationTurn>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

impl ConversationStore for InMemoryConversationStore {
    async fn load_history(&self, thread_id: &Uuid) -> Result<Vec<ConversationTurn>, RepositoryError> {
        Ok(self
            .threads
            .get(thread_id)
            .map(|turns| turns.clone())
            .unwrap_or_default())
    }

    async fn append_turns(
        &self,
        thread_id: &Uuid,
        turns: &[ConversationTurn],
    ) -> Result<(), RepositoryError> {
        self.threads
            .entry(*thread_id)
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    async fn thread_exists(&self, thread_id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.threads.contains_key(thread_id))
    }
}
