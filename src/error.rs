//! Error types for surrender-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum SurrenderError {
    /// I/O error while connecting or reading local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was issued without a live connection.
    #[error("Not connected: connect to a server before sending commands")]
    NotConnected,

    /// Peer closed the connection or the socket failed mid-operation.
    #[error("Connection closed")]
    Disconnected,

    /// No bytes arrived within the configured response timeout.
    #[error("Timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    /// The server reported an error (or a warning treated as fatal).
    #[error("Server error: {0}")]
    Server(String),

    /// Malformed data on the wire (unknown kind tag, implausible length, bad UTF-16).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A well-framed response carried pixel data that does not fit its shape.
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    /// Compressed payload could not be produced or did not match its size prefix.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A value has no wire representation.
    #[error("Value cannot be encoded: {0}")]
    Unencodable(String),

    /// An argument was rejected before anything was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A response lacked a field the operation needs.
    #[error("Response to '{command}' has no field '{field}'")]
    MissingField { command: String, field: String },

    /// A response field had the wrong kind.
    #[error("Field '{field}' is not {expected}")]
    UnexpectedType { field: String, expected: &'static str },
}

impl SurrenderError {
    /// Whether this error leaves the connection unusable.
    ///
    /// Framing cannot be trusted after a decode failure, so protocol errors
    /// are fatal along with transport failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SurrenderError::Disconnected | SurrenderError::Timeout(_) | SurrenderError::Protocol(_)
        )
    }
}

/// Result type alias using SurrenderError.
pub type Result<T> = std::result::Result<T, SurrenderError>;
