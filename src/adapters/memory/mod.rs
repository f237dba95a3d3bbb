//! Memory adapters implementing the `TurnMemory` port.

mod layered;

pub use layered::{scopes, LayeredMemory};
