//! Connection states and the event stream emitted by [`MatchClient`](crate::client::MatchClient).

use std::fmt;
use std::sync::Arc;

use crate::protocol::MatchSnapshot;

/// Lifecycle of one match connection.
///
/// ```text
/// Connecting → Bootstrapping → Live → Closed
///      └────────────┴──────────┴────→ Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Channel handshake in progress.
    Connecting,
    /// Channel open, snapshot fetch outstanding.
    Bootstrapping,
    /// Snapshot seeded, pushes are applied as they arrive.
    Live,
    /// Terminal failure: handshake failed, or bootstrap failed with no data.
    Errored,
    /// Channel closed by either side.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for [`Errored`](Self::Errored) and [`Closed`](Self::Closed).
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Errored | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Bootstrapping => "bootstrapping",
            ConnectionState::Live => "live",
            ConnectionState::Errored => "errored",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events delivered on the receiver returned from
/// [`MatchClient::start`](crate::client::MatchClient::start).
#[derive(Debug, Clone)]
pub enum MatchEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),

    /// The board model was replaced wholesale.
    SnapshotReplaced(Arc<MatchSnapshot>),

    /// A pushed or fetched payload was dropped; the previous model is retained.
    SnapshotRejected {
        /// Why the payload was dropped.
        reason: String,
    },

    /// The bootstrap fetch failed.
    BootstrapFailed {
        /// Error description.
        reason: String,
    },

    /// The channel reported an error. No state change follows by itself.
    TransportError {
        /// Error description.
        reason: String,
    },

    /// The event processor stopped. Always the last event.
    Closed {
        /// `None` when the server ended the stream cleanly.
        reason: Option<String>,
    },
}
