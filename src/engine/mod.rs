//! Check execution engine.
//!
//! Provides the result type, the durable result store, worker thread
//! management, the per-check execution wrapper and the check manager.

pub mod manager;
pub mod record;
pub mod registry;
pub mod report;
pub mod result;
pub mod store;
pub mod summary;
pub mod threads;
pub mod wrapper;
