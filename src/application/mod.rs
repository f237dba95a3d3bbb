//! Application layer - The per-turn session runner.
//!
//! This layer orchestrates domain operations and coordinates between
//! ports: it owns no dialog semantics of its own, only the load / drive /
//! persist cycle around each inbound activity.

pub mod runner;

pub use runner::{DialogRunner, RunTurnCommand, RunnerError, TurnOutcome};
