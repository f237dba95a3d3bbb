//! Persisted dialog stack records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::DialogId;

/// One activation of a dialog on a stack.
///
/// The `state` blob belongs to the dialog named by `id`; the engine never
/// interprets it beyond moving it in and out of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    pub id: DialogId,
    /// Opaque per-activation state, always a JSON object.
    pub state: Value,
    /// Version fingerprint of the dialog at activation time, when the
    /// dialog exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl DialogInstance {
    /// Creates a fresh instance with empty state.
    pub fn new(id: DialogId, version: Option<String>) -> Self {
        Self {
            id,
            state: Value::Object(serde_json::Map::new()),
            version,
        }
    }
}

/// The persisted stack for one (sub-)session. Top of stack is last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    #[serde(default)]
    pub dialog_stack: Vec<DialogInstance>,
}

impl DialogState {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.dialog_stack.len()
    }

    /// True when nothing is running.
    pub fn is_empty(&self) -> bool {
        self.dialog_stack.is_empty()
    }

    /// The active (top) frame.
    pub fn active(&self) -> Option<&DialogInstance> {
        self.dialog_stack.last()
    }

    /// Mutable view of the active frame.
    pub fn active_mut(&mut self) -> Option<&mut DialogInstance> {
        self.dialog_stack.last_mut()
    }

    /// Pushes a new frame, making it active.
    pub fn push(&mut self, instance: DialogInstance) {
        self.dialog_stack.push(instance);
    }

    /// Pops the active frame.
    pub fn pop(&mut self) -> Option<DialogInstance> {
        self.dialog_stack.pop()
    }
}
