//! Error types for hostlink
//!
//! `RelayError` covers server-side and library operations.
//! `TransportError` covers what the client can observe on the wire.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::network::CallPhase;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for hostlink operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid command envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Request too large: {size} bytes exceeds {max} byte limit")]
    RequestTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Scheduling Errors
    // -------------------------------------------------------------------------
    #[error("Host loop is no longer accepting work")]
    SchedulerClosed,

    #[error("Host loop dropped the work before it produced a result")]
    ResultDropped,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures observed by the client driver.
///
/// These never carry a server-side `status:"error"`; that arrives as a
/// regular [`Response`](crate::protocol::Response).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {timeout:?} while {phase}")]
    TimedOut { phase: CallPhase, timeout: Duration },

    #[error("Connection error while {phase}: {source}")]
    Io {
        phase: CallPhase,
        #[source]
        source: io::Error,
    },

    #[error("Server closed the connection without a response")]
    EmptyResponse,

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}
