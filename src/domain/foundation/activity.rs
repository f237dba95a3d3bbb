//! Inbound and outbound activity envelope.
//!
//! The engine only inspects the coarse shape of an activity: its kind, its
//! text for message turns, and its name/value for event turns. Everything
//! else about the transport envelope stays outside the crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse classification of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A user-visible message turn.
    Message,
    /// A named out-of-band event turn.
    Event,
    /// Anything else the transport delivers.
    #[serde(other)]
    Other,
}

/// One inbound or outbound activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub kind: ActivityKind,
    /// Message text, present on message activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Event name, present on event activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Event payload, present on event activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Activity {
    /// Creates a message activity.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: ActivityKind::Message,
            text: Some(text.into()),
            name: None,
            value: None,
        }
    }

    /// Creates a named event activity with an optional payload.
    pub fn event(name: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            kind: ActivityKind::Event,
            text: None,
            name: Some(name.into()),
            value,
        }
    }

    /// Returns true for message activities.
    pub fn is_message(&self) -> bool {
        self.kind == ActivityKind::Message
    }

    /// Returns the trimmed message text, or empty for non-message turns.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }
}
