//! Mock implementations for testing without a live fabric.
//!
//! This module provides a configurable in-memory fabric API, fake terminal
//! sessions, and helpers for building checks and run configurations.

pub mod fabric;

pub use engine::*;
pub use fabric::*;
