//! Channel implementations and wrappers.
//!
//! | Feature                | Item                                           |
//! |------------------------|------------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |
//! | (always)               | [`Reconnecting`], [`Backoff`]                  |
//!
//! # Example
//!
//! ```rust,ignore
//! use connect4_client::transports::{Backoff, Reconnecting, WebSocketConnector};
//!
//! let connector = Reconnecting::new(
//!     WebSocketConnector::for_match(&config, "abc"),
//!     Backoff::default().with_max_attempts(None),
//! );
//! let (client, events) = MatchClient::start("abc", connector, source, &config);
//! ```

pub mod reconnecting;

#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use reconnecting::{Backoff, Reconnecting, ReconnectingTransport};

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
