//! Platform abstraction layer.
//!
//! Contracts for the collaborators checks talk to:
//! - Fabric management API (through a local HTTP proxy)
//! - Terminal sessions to individual nodes

pub mod api;
pub mod session;

use thiserror::Error;

/// Failure talking to the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Connection, read or write problem
    #[error("transport error in {context}: {message}")]
    Transport { context: String, message: String },
    /// The API answered with an error object
    #[error("API error {code}: {text}")]
    Api { code: String, text: String },
    /// The response could not be decoded
    #[error("decode error in {context}: {message}")]
    Decode { context: String, message: String },
    /// Terminal session could not connect or log in
    #[error("session error on {host}: {message}")]
    Session { host: String, message: String },
    /// A command did not produce the expected output in time
    #[error("timed out after {timeout_secs}s waiting for {operation}")]
    Timeout { operation: String, timeout_secs: u64 },
}
