//! Terminal sessions to individual fabric nodes.
//!
//! Only the contract lives here. Session I/O blocks and cannot be
//! interrupted from outside, which is why check timeouts are advisory.

use crate::context::Credentials;
use crate::platform::PlatformError;
use std::time::Duration;

/// An interactive command session on one node.
pub trait TerminalSession: Send {
    /// Open the connection. Fails on refusal or unreachable host.
    fn connect(&mut self) -> Result<(), PlatformError>;

    /// Authenticate. Fails on bad credentials.
    fn login(&mut self) -> Result<(), PlatformError>;

    /// Run a command and return everything it printed before the prompt
    /// came back. Fails on timeout or EOF.
    fn run(&mut self, command: &str, timeout: Duration) -> Result<String, PlatformError>;
}

/// Opens sessions to nodes by address.
pub trait SessionFactory: Send + Sync {
    fn open(&self, host: &str, credentials: &Credentials) -> Box<dyn TerminalSession>;
}
