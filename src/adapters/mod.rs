//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to the outside world:
//! - `memory` - Layered turn memory scopes
//! - `recognizer` - Keyword-based intent recognition
//! - `storage` - In-memory and file-backed session stores

pub mod memory;
pub mod recognizer;
pub mod storage;
