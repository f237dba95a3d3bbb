//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `ConversationStore` - Persists session state between turns
//! - `Recognizer` - Produces intents/entities from inbound activities
//! - `TurnMemory` - Path-addressable memory scopes for one turn

mod conversation_store;
mod memory;
mod recognizer;

pub use conversation_store::{ConversationStore, StoreError};
pub use memory::{MemoryError, TurnMemory};
pub use recognizer::{
    IntentScore, Recognizer, RecognizerError, RecognizerResult, NONE_INTENT,
};
