//! Memory Port - Interface for path-addressable turn memory.
//!
//! Dialogs read and write values through dotted paths like
//! `conversation.profile.name` or `turn.last_result`. The first path
//! segment names a scope; how scopes are layered and persisted is an
//! adapter concern.

use serde_json::Value;

/// Errors that can occur during memory operations
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Unknown memory scope '{0}'")]
    UnknownScope(String),

    #[error("Invalid memory path '{0}'")]
    InvalidPath(String),

    #[error("Path '{path}' traverses a non-object value")]
    NotAnObject { path: String },
}

/// Port for reading and writing path-addressable values during a turn
///
/// Synchronous on purpose: memory is in-process data for the duration of
/// a turn, persisted wholesale by the session runner afterwards.
pub trait TurnMemory: Send + Sync {
    /// Read the value at a dotted path
    ///
    /// # Arguments
    /// * `path` - Dotted path, first segment is the scope name
    ///
    /// # Returns
    /// A clone of the value, or `None` when any segment is missing
    fn get_value(&self, path: &str) -> Option<Value>;

    /// Write a value at a dotted path, creating intermediate objects
    ///
    /// # Arguments
    /// * `path` - Dotted path, first segment is the scope name
    /// * `value` - The value to store
    ///
    /// # Errors
    /// Returns `MemoryError` if the scope is unknown or the path traverses
    /// a non-object value
    fn set_value(&mut self, path: &str, value: Value) -> Result<(), MemoryError>;
}
