//! Error types for the dialog engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::DialogId;
use crate::ports::{MemoryError, RecognizerError};

/// Snapshot of the dialog stack captured when an error escapes a turn.
///
/// Attached once to the original error so callers can see where in the
/// stack the failure happened without the engine logging anything itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDiagnostics {
    /// Id of the dialog that was active when the error surfaced.
    pub active_dialog: Option<DialogId>,
    /// Id of the active dialog in the parent context, if nested.
    pub parent_active_dialog: Option<DialogId>,
    /// The full stack at the failing context, bottom first.
    pub stack: Vec<DialogId>,
}

impl fmt::Display for StackDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self
            .active_dialog
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("<none>");
        let parent = self
            .parent_active_dialog
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("<none>");
        let stack: Vec<&str> = self.stack.iter().map(|id| id.as_str()).collect();
        write!(
            f,
            "active={} parent_active={} stack=[{}]",
            active,
            parent,
            stack.join(", ")
        )
    }
}

/// Errors raised by dialog stack operations.
#[derive(Debug, Error)]
pub enum DialogError {
    /// A dialog id could not be resolved through the context chain.
    #[error("Dialog '{id}' was not found in the dialog set or any ancestor")]
    DialogNotFound { id: DialogId },

    /// Two dialogs with the same id were added to one set.
    #[error("A dialog with id '{id}' is already registered")]
    DuplicateDialog { id: DialogId },

    /// A persisted instance no longer matches its dialog's version
    /// fingerprint and no handler claimed the `version_changed` event.
    #[error("Persisted state of dialog '{id}' no longer matches its registered version")]
    VersionChanged { id: DialogId },

    /// An operation that needs an active dialog found the stack empty.
    #[error("No active dialog on the stack")]
    NoActiveDialog,

    /// `next()` was called twice within one step invocation.
    #[error("next() already called for step {index} of dialog '{id}'")]
    StepAlreadyAdvanced { id: DialogId, index: usize },

    /// A dialog handler failed with an application-level error.
    #[error("{0}")]
    Handler(String),

    /// A memory scope read or write failed.
    #[error("Memory operation failed: {0}")]
    Memory(#[from] MemoryError),

    /// The recognizer port failed.
    #[error("Recognition failed: {0}")]
    Recognizer(#[from] RecognizerError),

    /// Persisted dialog state could not be encoded or decoded.
    #[error("State serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error annotated with the stack snapshot at the failing context.
    #[error("{source}")]
    Diagnosed {
        #[source]
        source: Box<DialogError>,
        diagnostics: StackDiagnostics,
    },
}

impl DialogError {
    /// Creates a handler error from an application-level message.
    pub fn handler(message: impl Into<String>) -> Self {
        DialogError::Handler(message.into())
    }

    /// Attaches stack diagnostics to this error.
    ///
    /// Idempotent: an already-annotated error is returned unchanged, so
    /// nested contexts never stack wrappers.
    pub fn with_diagnostics(self, diagnostics: StackDiagnostics) -> Self {
        match self {
            DialogError::Diagnosed { .. } => self,
            other => DialogError::Diagnosed {
                source: Box::new(other),
                diagnostics,
            },
        }
    }

    /// Returns the attached diagnostics, if any.
    pub fn diagnostics(&self) -> Option<&StackDiagnostics> {
        match self {
            DialogError::Diagnosed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    /// Returns the underlying error, unwrapping the diagnostic layer.
    pub fn root(&self) -> &DialogError {
        match self {
            DialogError::Diagnosed { source, .. } => source,
            other => other,
        }
    }
}
