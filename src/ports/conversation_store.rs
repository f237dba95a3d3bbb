//! Conversation Store Port - Interface for persisting session state.
//!
//! This port defines how the per-conversation session record (root dialog
//! stack plus memory scopes) is saved and loaded between turns, supporting
//! both in-memory and file-backed storage.

use async_trait::async_trait;

use crate::domain::dialog::SessionState;
use crate::domain::foundation::ConversationId;

/// Errors that can occur during conversation store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize session: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize session: {0}")]
    DeserializationFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Port for persisting and loading session state
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load the session for a conversation
    ///
    /// # Arguments
    /// * `id` - The conversation ID
    ///
    /// # Returns
    /// The stored session, or `None` when the conversation has no record yet
    ///
    /// # Errors
    /// Returns `StoreError` if the read or deserialization fails
    async fn load(&self, id: &ConversationId) -> Result<Option<SessionState>, StoreError>;

    /// Save the session for a conversation
    ///
    /// # Arguments
    /// * `id` - The conversation ID
    /// * `session` - The session record to persist
    ///
    /// # Errors
    /// Returns `StoreError` if serialization or the write fails
    async fn save(&self, id: &ConversationId, session: &SessionState) -> Result<(), StoreError>;

    /// Delete the session for a conversation
    ///
    /// # Arguments
    /// * `id` - The conversation ID
    ///
    /// # Errors
    /// Returns `StoreError` if the delete fails
    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError>;
}
