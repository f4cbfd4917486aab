//! Error types for the Connect Four client.

use thiserror::Error;

/// Errors that can occur when using the Connect Four client.
#[derive(Debug, Error)]
pub enum Connect4Error {
    /// Failed to send a message through the persistent channel.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the persistent channel.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The persistent channel was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payload decoded but does not describe a valid match snapshot.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Attempted an operation that requires an open channel.
    #[error("not connected to server")]
    NotConnected,

    /// The bootstrap fetch answered with a non-2xx status.
    #[error("snapshot fetch failed with HTTP status {status}")]
    Http {
        /// Status code returned by the API.
        status: u16,
    },

    /// The bootstrap fetch failed before a response was received.
    #[error("snapshot fetch error: {0}")]
    Fetch(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The identity store could not be read or written.
    #[error("identity store error: {0}")]
    Identity(String),
}

/// A specialized [`Result`] type for Connect Four client operations.
pub type Result<T> = std::result::Result<T, Connect4Error>;
