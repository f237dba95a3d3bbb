//! Foundation module - Shared domain primitives.
//!
//! Contains the value objects, identifiers, and error types that form the
//! vocabulary of the dialog engine.

mod activity;
mod errors;
mod ids;
mod timestamp;

pub use activity::{Activity, ActivityKind};
pub use errors::{DialogError, StackDiagnostics};
pub use ids::{ConversationId, DialogId};
pub use timestamp::Timestamp;
