//! Domain layer containing the dialog engine and its planning extension.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (activities, IDs, errors)
//! - `dialog` - The persisted dialog stack: contexts, containers, commands
//! - `planning` - Rule-directed plans executed over the dialog stack

pub mod dialog;
pub mod foundation;
pub mod planning;
