//! Keyword Recognizer Adapter
//!
//! A deliberately simple `Recognizer`: case-insensitive keyword lookup
//! mapping substrings of the utterance to intents and entities. Enough
//! to drive intent rules in tests, development bots and demos without an
//! NLU service behind them.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::foundation::Activity;
use crate::ports::{IntentScore, Recognizer, RecognizerError, RecognizerResult};

/// Keyword-to-intent and keyword-to-entity recognizer.
#[derive(Debug, Clone, Default)]
pub struct KeywordRecognizer {
    intents: Vec<(String, String)>,
    entities: Vec<(String, String)>,
}

impl KeywordRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps an utterance keyword to an intent name.
    pub fn with_intent(mut self, keyword: impl Into<String>, intent: impl Into<String>) -> Self {
        self.intents.push((keyword.into().to_lowercase(), intent.into()));
        self
    }

    /// Maps an utterance keyword to an entity name; the matched keyword
    /// becomes the entity value.
    pub fn with_entity(mut self, keyword: impl Into<String>, entity: impl Into<String>) -> Self {
        self.entities.push((keyword.into().to_lowercase(), entity.into()));
        self
    }

    /// Longer keywords cover more of the utterance and score higher.
    fn score(keyword: &str, text: &str) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        (keyword.len() as f64 / text.len() as f64).min(1.0)
    }
}

#[async_trait]
impl Recognizer for KeywordRecognizer {
    async fn recognize(&self, activity: &Activity) -> Result<RecognizerResult, RecognizerError> {
        let text = activity.text.clone().unwrap_or_default();
        let haystack = text.to_lowercase();

        let mut result = RecognizerResult {
            text: activity.text.clone(),
            intents: Default::default(),
            entities: Value::Object(Map::new()),
        };

        for (keyword, intent) in &self.intents {
            if !haystack.contains(keyword.as_str()) {
                continue;
            }
            let score = Self::score(keyword, &haystack);
            let entry = result
                .intents
                .entry(intent.clone())
                .or_insert(IntentScore { score });
            if score > entry.score {
                entry.score = score;
            }
        }

        for (keyword, entity) in &self.entities {
            if !haystack.contains(keyword.as_str()) {
                continue;
            }
            if let Some(object) = result.entities.as_object_mut() {
                let values = object
                    .entry(entity.clone())
                    .or_insert_with(|| json!([]));
                if let Some(list) = values.as_array_mut() {
                    list.push(Value::String(keyword.clone()));
                }
            }
        }

        Ok(result)
    }
}
