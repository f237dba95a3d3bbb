//! Dialog events and the well-known event names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event names raised by the stack machine itself.
pub mod dialog_events {
    /// First inbound activity of a turn, offered leaf-first before any
    /// dialog is continued.
    pub const ACTIVITY_RECEIVED: &str = "activity_received";
    /// Offered to the active dialog before its `reprompt_dialog` hook runs.
    pub const REPROMPT_DIALOG: &str = "reprompt_dialog";
    /// Offered to each frame a cancel sweep is about to pop, after the
    /// first. Handling it halts the sweep.
    pub const CANCEL_DIALOG: &str = "cancel_dialog";
    /// Raised when an error escapes a turn, giving ancestors a chance to
    /// recover before the error reaches the caller.
    pub const ERROR: &str = "error";
    /// Raised when a persisted instance's version fingerprint no longer
    /// matches its dialog. Unhandled, the turn fails.
    pub const VERSION_CHANGED: &str = "version_changed";
}

/// A named occurrence dispatched through the dialog stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogEvent {
    /// Event name, usually one of the `dialog_events` constants.
    pub name: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whether an unhandled event escalates to the parent context.
    pub bubble: bool,
}

impl DialogEvent {
    /// Creates an event.
    pub fn new(name: impl Into<String>, value: Option<Value>, bubble: bool) -> Self {
        Self {
            name: name.into(),
            value,
            bubble,
        }
    }
}
