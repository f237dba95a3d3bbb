//! File-based Conversation Store Adapter
//!
//! Stores each conversation's session record as one YAML file on disk,
//! named by the conversation id for easy inspection.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::dialog::SessionState;
use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationStore, StoreError};

/// File-based storage for session state
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    base_path: PathBuf,
}

impl FileConversationStore {
    /// Create a new file store with a base directory
    ///
    /// # Arguments
    /// * `base_path` - The root directory for session files
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the session file path for a conversation
    fn session_file_path(&self, id: &ConversationId) -> PathBuf {
        self.base_path.join(format!("{id}.yaml"))
    }

    /// Ensure the base directory exists
    async fn ensure_base_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<SessionState>, StoreError> {
        let file_path = self.session_file_path(id);

        let yaml = match fs::read_to_string(&file_path).await {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        };

        let session = serde_yaml::from_str(&yaml)
            .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;

        Ok(Some(session))
    }

    async fn save(&self, id: &ConversationId, session: &SessionState) -> Result<(), StoreError> {
        self.ensure_base_dir().await?;

        let yaml = serde_yaml::to_string(session)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

        fs::write(self.session_file_path(id), yaml)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError> {
        match fs::remove_file(self.session_file_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::IoError(e.to_string())),
        }
    }
}
