//! # Connect Four Client
//!
//! Async client for a server-authoritative Connect Four match.
//!
//! The server owns the game. This crate keeps a live copy of one match in
//! sync, works out whose turn it is, decides which cell a hovered move would
//! land on, and sends a move only when the local player is allowed to make it.
//!
//! ## Features
//!
//! - **Wholesale snapshots**: every push replaces the board model atomically,
//!   single- or double-encoded JSON alike
//! - **Turn resolution**: the authoritative next mover, with a parity fallback
//! - **Gated input**: out-of-turn or disconnected moves never reach the network
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend; `transport-websocket` (default) provides [`WebSocketTransport`]
//! - **Reconnect with backoff**: wrap any connector in [`Reconnecting`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-fetch"))]
//! # async fn run() -> Result<(), connect4_client::Connect4Error> {
//! use connect4_client::{ClientConfig, MatchEvent, MatchView, MemoryIdentityStore};
//!
//! let config = ClientConfig::from_env()?;
//! let identity = MemoryIdentityStore::with_entry("abc", "alice");
//! let (mut view, mut events) = MatchView::connect("abc", &identity, &config)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let MatchEvent::Closed { .. } = event {
//!         break;
//!     }
//!     let _ = view.presentation();
//! }
//! view.unmount().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod drop_target;
pub mod error;
pub mod event;
pub mod fetch;
pub mod gate;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod transports;
pub mod turn;
pub mod view;

// Re-export primary types for ergonomic imports.
pub use client::MatchClient;
pub use config::ClientConfig;
pub use error::Connect4Error;
pub use event::{ConnectionState, MatchEvent};
pub use fetch::SnapshotSource;
pub use gate::{Rejection, Submission};
pub use identity::{IdentityStore, JsonFileIdentityStore, MemoryIdentityStore};
pub use protocol::{decode_snapshot, Board, Cell, MatchSnapshot, MoveRequest};
pub use transport::{Connected, Connector, Transport};
pub use transports::{Backoff, Reconnecting};
pub use turn::MatchStatus;
pub use view::{MatchView, Presentation};

#[cfg(feature = "http-fetch")]
pub use fetch::HttpSnapshotSource;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
