//! Conversation store trait definition.

use uuid::Uuid;

use triage_types::chat::ConversationTurn;
use triage_types::error::RepositoryError;

/// Persistence collaborator for conversation threads.
///
/// The cascade never persists on its own; callers load history before an
/// invocation and append the exchanged turns afterwards.
/// Implementations live in triage-infra (e.g., `InMemoryConversationStore`).
pub trait ConversationStore: Send + Sync {
    /// All turns of a thread in order. Unknown threads have empty history.
    fn load_history(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;

    /// Append turns to the end of a thread, creating it if needed.
    fn append_turns(
        &self,
        thread_id: &Uuid,
        turns: &[ConversationTurn],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Whether a thread has been recorded.
    fn thread_exists(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
