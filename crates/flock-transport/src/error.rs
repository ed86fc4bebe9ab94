//! Error types for flock-transport.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking to nodes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Fewer nodes answered discovery than were requested.
    #[error("discovery found {found} of {requested} nodes")]
    Discovery { requested: usize, found: usize },

    /// No reply arrived before the response timeout.
    #[error("no response from {addr} within {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    /// The receive loop has shut down.
    #[error("transport receiver closed")]
    Closed,

    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
