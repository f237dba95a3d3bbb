//! The persisted session record for one conversation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DialogState;
use crate::domain::foundation::Timestamp;

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Everything the engine persists per conversation: the root dialog stack,
/// the conversation and user memory scopes, and the last-access stamp the
/// runner uses for expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub dialog_state: DialogState,
    /// Conversation-scoped memory values.
    #[serde(default = "empty_object")]
    pub conversation: Value,
    /// User-scoped memory values. Survives session expiry.
    #[serde(default = "empty_object")]
    pub user: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<Timestamp>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            dialog_state: DialogState::new(),
            conversation: empty_object(),
            user: empty_object(),
            last_access: None,
        }
    }
}

impl SessionState {
    /// Creates a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the dialog stack and the conversation scope, keeping the
    /// user scope. Applied when a session outlives its expiry window.
    pub fn reset_conversation(&mut self) {
        self.dialog_state = DialogState::new();
        self.conversation = empty_object();
    }
}
