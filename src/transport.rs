//! Persistent channel abstraction.
//!
//! The [`Transport`] trait is the capability the connection manager talks to:
//! send a text frame, receive the next text frame, close. The game server
//! pushes JSON-encoded snapshots and accepts JSON-encoded moves, so every
//! implementation only has to move whole text messages.
//!
//! # Connection Setup
//!
//! Opening a channel is the job of a [`Connector`]. Keeping the handshake
//! behind its own trait lets the connection manager own the `Connecting` phase
//! and lets a reconnecting strategy re-run it without the manager noticing
//! (see [`Reconnecting`](crate::transports::Reconnecting)). If a transport has
//! already been opened by other means, wrap it in [`Connected`].
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use connect4_client::error::Connect4Error;
//! use connect4_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), Connect4Error> {
//!         // Send the JSON text message over your channel
//!         # let _ = message;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, Connect4Error>> {
//!         // Receive the next JSON text message, None once closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), Connect4Error> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Connect4Error;

/// A bidirectional text message channel to the game server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the connection
/// manager calls it inside `tokio::select!`. Cancelling it must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::TransportSend`] or [`Connect4Error::TransportClosed`]
    /// if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), Connect4Error>;

    /// Receive the next text message.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the channel was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, Connect4Error>>;

    /// Close the channel gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), Connect4Error>;
}

/// Opens a [`Transport`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced on success.
    type Transport: Transport;

    /// Perform the channel handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel could not be opened.
    async fn connect(&self) -> Result<Self::Transport, Connect4Error>;
}

/// A [`Connector`] that hands over an already-open transport exactly once.
///
/// Later calls to [`connect`](Connector::connect) fail with
/// [`Connect4Error::NotConnected`].
#[derive(Debug)]
pub struct Connected<T> {
    transport: Mutex<Option<T>>,
}

impl<T: Transport> Connected<T> {
    /// Wrap an open transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
        }
    }
}

#[async_trait]
impl<T: Transport> Connector for Connected<T> {
    type Transport = T;

    async fn connect(&self) -> Result<T, Connect4Error> {
        self.transport
            .lock()
            .await
            .take()
            .ok_or(Connect4Error::NotConnected)
    }
}
