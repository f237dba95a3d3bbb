//! Layered Memory Adapter
//!
//! Backs the `TurnMemory` port with named scope objects (`turn`,
//! `conversation`, `user`). The runner seeds the conversation and user
//! scopes from the stored session before a turn and extracts them again
//! afterwards; the turn scope never outlives the turn.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::ports::{MemoryError, TurnMemory};

/// Scope names the engine relies on.
pub mod scopes {
    pub const TURN: &str = "turn";
    pub const CONVERSATION: &str = "conversation";
    pub const USER: &str = "user";
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Path-addressable memory over named scope objects.
#[derive(Debug, Clone)]
pub struct LayeredMemory {
    scopes: HashMap<String, Value>,
}

impl LayeredMemory {
    /// Creates a memory manager with empty `turn`, `conversation` and
    /// `user` scopes.
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(scopes::TURN.to_string(), empty_object());
        scopes.insert(scopes::CONVERSATION.to_string(), empty_object());
        scopes.insert(scopes::USER.to_string(), empty_object());
        Self { scopes }
    }

    /// Replaces a scope's contents wholesale. Anything that is not a
    /// JSON object is normalized to an empty object.
    pub fn with_scope(mut self, name: impl Into<String>, value: Value) -> Self {
        let value = if value.is_object() {
            value
        } else {
            empty_object()
        };
        self.scopes.insert(name.into(), value);
        self
    }

    /// Removes and returns a scope's contents, leaving an empty object
    /// behind. Used by the runner to persist scopes after a turn.
    pub fn take_scope(&mut self, name: &str) -> Value {
        self.scopes
            .insert(name.to_string(), empty_object())
            .unwrap_or_else(empty_object)
    }

    fn segments(path: &str) -> Result<Vec<&str>, MemoryError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(MemoryError::InvalidPath(path.to_string()));
        }
        Ok(segments)
    }
}

impl Default for LayeredMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnMemory for LayeredMemory {
    fn get_value(&self, path: &str) -> Option<Value> {
        let segments = Self::segments(path).ok()?;
        let (scope, rest) = segments.split_first()?;
        let mut current = self.scopes.get(*scope)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current.clone())
    }

    fn set_value(&mut self, path: &str, value: Value) -> Result<(), MemoryError> {
        let segments = Self::segments(path)?;
        let [scope, rest @ .., last] = segments.as_slice() else {
            // A bare scope name cannot be assigned through the path API.
            return Err(MemoryError::InvalidPath(path.to_string()));
        };
        let mut current = self
            .scopes
            .get_mut(*scope)
            .ok_or_else(|| MemoryError::UnknownScope((*scope).to_string()))?;
        for segment in rest {
            let object = current
                .as_object_mut()
                .ok_or_else(|| MemoryError::NotAnObject {
                    path: path.to_string(),
                })?;
            current = object
                .entry((*segment).to_string())
                .or_insert_with(empty_object);
        }
        let object = current
            .as_object_mut()
            .ok_or_else(|| MemoryError::NotAnObject {
                path: path.to_string(),
            })?;
        object.insert((*last).to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn set_then_get_roundtrips_nested_paths() {
        let mut memory = LayeredMemory::new();
        memory
            .set_value("conversation.profile.name", json!("Ada"))
            .unwrap();
        memory.set_value("conversation.profile.age", json!(36)).unwrap();

        assert_eq!(memory.get_value("conversation.profile.name"), Some(json!("Ada")));
        assert_eq!(
            memory.get_value("conversation.profile"),
            Some(json!({"name": "Ada", "age": 36}))
        );
    }

    #[test]
    fn missing_segments_read_as_none() {
        let memory = LayeredMemory::new();
        assert_eq!(memory.get_value("user.name"), None);
        assert_eq!(memory.get_value("nosuchscope.name"), None);
    }

    #[test]
    fn whole_scope_reads_return_the_object() {
        let memory = LayeredMemory::new().with_scope("user", json!({"name": "sam"}));
        assert_eq!(memory.get_value("user"), Some(json!({"name": "sam"})));
    }

    #[test]
    fn writing_to_an_unknown_scope_fails() {
        let mut memory = LayeredMemory::new();
        let err = memory.set_value("galaxy.name", json!("m31")).unwrap_err();
        assert!(matches!(err, MemoryError::UnknownScope(scope) if scope == "galaxy"));
    }

    #[test]
    fn traversing_a_scalar_fails() {
        let mut memory = LayeredMemory::new();
        memory.set_value("turn.count", json!(3)).unwrap();
        let err = memory.set_value("turn.count.more", json!(4)).unwrap_err();
        assert!(matches!(err, MemoryError::NotAnObject { .. }));
        assert_eq!(memory.get_value("turn.count.more"), None);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let mut memory = LayeredMemory::new();
        assert!(matches!(
            memory.set_value("turn", json!(1)),
            Err(MemoryError::InvalidPath(_))
        ));
        assert!(matches!(
            memory.set_value("turn..value", json!(1)),
            Err(MemoryError::InvalidPath(_))
        ));
        assert!(matches!(
            memory.set_value("", json!(1)),
            Err(MemoryError::InvalidPath(_))
        ));
    }

    #[test]
    fn non_object_scope_seeds_are_normalized() {
        let memory = LayeredMemory::new().with_scope("conversation", json!("oops"));
        assert_eq!(memory.get_value("conversation"), Some(json!({})));
    }

    #[test]
    fn take_scope_extracts_and_resets() {
        let mut memory = LayeredMemory::new();
        memory.set_value("user.name", json!("Ada")).unwrap();

        let taken = memory.take_scope("user");

        assert_eq!(taken, json!({"name": "Ada"}));
        assert_eq!(memory.get_value("user"), Some(json!({})));
    }

    fn arb_scope() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just(scopes::TURN),
            Just(scopes::CONVERSATION),
            Just(scopes::USER),
        ]
    }

    proptest! {
        /// Any well-formed path reads back exactly what was written.
        #[test]
        fn well_formed_paths_roundtrip(
            scope in arb_scope(),
            segments in prop::collection::vec("[a-z][a-z0-9_]{0,7}", 1..4),
            leaf in any::<i64>(),
        ) {
            let mut memory = LayeredMemory::new();
            let path = format!("{}.{}", scope, segments.join("."));
            memory.set_value(&path, json!(leaf)).expect("well-formed path");
            prop_assert_eq!(memory.get_value(&path), Some(json!(leaf)));
        }

        /// A path with an empty segment is rejected without touching state.
        #[test]
        fn empty_segments_never_write(
            scope in arb_scope(),
            segment in "[a-z]{1,8}",
        ) {
            let mut memory = LayeredMemory::new();
            let path = format!("{}..{}", scope, segment);
            prop_assert!(matches!(
                memory.set_value(&path, json!(1)),
                Err(MemoryError::InvalidPath(_))
            ));
            prop_assert_eq!(memory.get_value(scope), Some(json!({})));
        }
    }
}
