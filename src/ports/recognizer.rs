//! Recognizer Port - Interface for intent and entity recognition.
//!
//! The planning engine only consumes the shape of a recognition result:
//! scored intents for rule ranking and an entity bag rules may inspect.
//! Which NLU service produces it stays behind this port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::foundation::Activity;

/// Name of the canonical empty intent.
pub const NONE_INTENT: &str = "None";

/// Errors that can occur during recognition
#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("Recognition service error: {0}")]
    ServiceError(String),

    #[error("Malformed recognition response: {0}")]
    MalformedResponse(String),
}

/// Confidence score attached to a recognized intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    pub score: f64,
}

/// Result of recognizing one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerResult {
    /// The recognized utterance text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Scored intents keyed by intent name.
    #[serde(default)]
    pub intents: HashMap<String, IntentScore>,
    /// Recognized entities as an open JSON object.
    #[serde(default)]
    pub entities: Value,
}

impl RecognizerResult {
    /// Builds the canonical empty result for an utterance.
    ///
    /// Used when no recognizer is configured or recognition produced no
    /// intents, so downstream rules always see at least the none intent.
    pub fn none(text: Option<String>) -> Self {
        let mut intents = HashMap::new();
        intents.insert(NONE_INTENT.to_string(), IntentScore { score: 0.0 });
        Self {
            text,
            intents,
            entities: Value::Object(serde_json::Map::new()),
        }
    }

    /// Returns true when no intent beyond the none intent was recognized.
    pub fn is_none_intent(&self) -> bool {
        self.intents.is_empty()
            || (self.intents.len() == 1 && self.intents.contains_key(NONE_INTENT))
    }
}

/// Port for turning an inbound activity into intents and entities
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize intents and entities in an activity
    ///
    /// # Arguments
    /// * `activity` - The inbound activity, typically a message
    ///
    /// # Errors
    /// Returns `RecognizerError` if the recognition service fails
    async fn recognize(&self, activity: &Activity) -> Result<RecognizerResult, RecognizerError>;
}
