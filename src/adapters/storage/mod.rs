//! Storage Adapters
//!
//! Implementations of the ConversationStore port for persisting session
//! state between turns.
//!
//! ## Available Adapters
//!
//! - **FileConversationStore** - One YAML file per conversation on disk
//! - **InMemoryConversationStore** - Shared map (testing/development)

mod file_conversation_store;
mod in_memory_conversation_store;

pub use file_conversation_store::FileConversationStore;
pub use in_memory_conversation_store::InMemoryConversationStore;
