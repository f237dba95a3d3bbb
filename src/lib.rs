//! Colloquy - Stack-Based Dialog Execution Engine
//!
//! This crate implements a resumable dialog stack machine with a
//! rule-directed planning layer on top, persisting conversation state
//! between turns through pluggable stores.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
