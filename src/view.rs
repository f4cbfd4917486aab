//! One match view bound to one [`MatchClient`].
//!
//! [`MatchView::mount`] reads the local player's name from an injected
//! [`IdentityStore`] and starts the connection manager. The hover/leave/click
//! methods form the interaction surface; [`MatchView::presentation`] derives
//! what to show from the current snapshot. [`MatchView::unmount`] closes the
//! channel. A view is never reused for a different match.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::MatchClient;
use crate::config::{self, ClientConfig};
use crate::drop_target::{DropContext, DropTargets};
use crate::event::MatchEvent;
use crate::fetch::SnapshotSource;
use crate::gate::{self, Submission};
use crate::identity::IdentityStore;
use crate::protocol::{Cell, MatchSnapshot};
use crate::transport::Connector;
use crate::turn::{match_status, MatchStatus};

/// What the view shows, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// No snapshot yet and the connection is still coming up.
    Loading,
    /// No snapshot and the connection ended; nothing more will arrive.
    NoData,
    /// No local name is stored for this match. The player has to rejoin.
    MissingIdentity,
    /// The second seat is empty. Carries the creator's name.
    WaitingForOpponent { player1: String },
    /// A match in progress or finished.
    Board(BoardView),
}

/// Render data for a match with both seats taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub player1: String,
    pub player2: String,
    pub local_player: String,
    pub status: MatchStatus,
    /// Current move count, shown only while the match is unfinished.
    pub move_number: Option<u32>,
    pub finished_at: Option<String>,
    /// Whether the local player may move right now.
    pub can_act: bool,
    /// Rows top to bottom, each cell tagged with its drop-target flag.
    pub cells: Vec<Vec<CellView>>,
}

impl BoardView {
    /// The highlighted landing cell, if any.
    pub fn drop_target(&self) -> Option<(usize, usize)> {
        self.cells.iter().enumerate().find_map(|(row, cells)| {
            cells
                .iter()
                .position(|cell| cell.drop_target)
                .map(|col| (row, col))
        })
    }
}

/// One board cell as shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellView {
    pub cell: Cell,
    pub drop_target: bool,
}

struct CachedTargets {
    snapshot: Arc<MatchSnapshot>,
    targets: DropTargets,
}

/// A mounted match view.
///
/// [`unmount`](Self::unmount) closes the channel and waits for the connection
/// manager to stop. Dropping the view only signals the close and gives the
/// manager `shutdown_timeout` to finish it.
pub struct MatchView {
    client: MatchClient,
    local_player: Option<String>,
    hovered_col: Option<usize>,
    targets: Option<CachedTargets>,
}

impl MatchView {
    /// Read the local name for `match_id` and start the connection manager.
    ///
    /// A store that cannot be read is logged and treated like a missing name.
    pub fn mount<C, S>(
        match_id: impl Into<String>,
        identity: &dyn IdentityStore,
        connector: C,
        source: S,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<MatchEvent>)
    where
        C: Connector,
        S: SnapshotSource,
    {
        let match_id = match_id.into();
        let local_player = match identity.player_name(&match_id) {
            Ok(name) => name.filter(|name| !name.is_empty()),
            Err(e) => {
                warn!(match_id = %match_id, "could not read player name: {e}");
                None
            }
        };
        if local_player.is_none() {
            debug!(match_id = %match_id, "no player name stored for match");
        }

        let (client, events) = MatchClient::start(match_id, connector, source, config);
        let view = Self {
            client,
            local_player,
            hovered_col: None,
            targets: None,
        };
        (view, events)
    }

    /// Mount over the WebSocket channel and HTTP bootstrap named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::Fetch`](crate::error::Connect4Error::Fetch) if
    /// the HTTP client cannot be built.
    #[cfg(all(feature = "transport-websocket", feature = "http-fetch"))]
    pub fn connect(
        match_id: impl Into<String>,
        identity: &dyn IdentityStore,
        config: &ClientConfig,
    ) -> crate::error::Result<(Self, mpsc::Receiver<MatchEvent>)> {
        let match_id = match_id.into();
        let connector = crate::transports::WebSocketConnector::for_match(config, &match_id);
        let source = crate::fetch::HttpSnapshotSource::new(config)?;
        Ok(Self::mount(match_id, identity, connector, source, config))
    }

    pub fn client(&self) -> &MatchClient {
        &self.client
    }

    pub fn local_player(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    pub fn hovered_col(&self) -> Option<usize> {
        self.hovered_col
    }

    /// Point at `col`. The hover sticks only while the local player can act.
    ///
    /// Returns `true` if `col` is now hovered.
    pub fn hover(&mut self, col: usize) -> bool {
        let can_act = match (self.client.snapshot(), self.local_player.as_deref()) {
            (Some(snapshot), Some(name)) => {
                !snapshot.is_waiting_for_opponent() && gate::can_act(&snapshot, name)
            }
            _ => false,
        };
        self.hovered_col = can_act.then_some(col);
        can_act
    }

    /// Pointer left the board.
    pub fn leave(&mut self) {
        self.hovered_col = None;
    }

    /// Click on column `col`.
    ///
    /// The row of the clicked cell does not matter; the server decides where
    /// the piece lands. Nothing is sent unless the move is permitted.
    pub fn click(&mut self, col: usize) -> Submission {
        self.client.submit_move(self.local_player.as_deref(), col)
    }

    /// Link a second player can use to join, relative to `origin`.
    pub fn share_link(&self, origin: &str) -> String {
        config::share_link(origin, self.client.match_id())
    }

    /// Derive what to show from the current snapshot and connection state.
    pub fn presentation(&mut self) -> Presentation {
        let Some(snapshot) = self.client.snapshot() else {
            self.targets = None;
            return if self.client.connection_state().is_terminal() {
                Presentation::NoData
            } else {
                Presentation::Loading
            };
        };

        let Some(local_player) = self.local_player.clone() else {
            return Presentation::MissingIdentity;
        };

        let Some(player2) = snapshot.player2.clone() else {
            return Presentation::WaitingForOpponent {
                player1: snapshot.player1.clone(),
            };
        };

        let ctx = DropContext::new(&snapshot, Some(&local_player), self.hovered_col);
        let targets = self.refresh_targets(&snapshot);
        let cells = snapshot
            .board
            .rows()
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                cells
                    .iter()
                    .enumerate()
                    .map(|(col, &cell)| CellView {
                        cell,
                        drop_target: targets.is_drop_target(&snapshot.board, row, col, ctx),
                    })
                    .collect()
            })
            .collect();

        Presentation::Board(BoardView {
            player1: snapshot.player1.clone(),
            player2,
            status: match_status(&snapshot, &local_player),
            move_number: (!snapshot.is_finished()).then_some(snapshot.move_number),
            finished_at: snapshot.finished_at.clone(),
            can_act: gate::can_act(&snapshot, &local_player),
            local_player,
            cells,
        })
    }

    /// Close the channel and stop the connection manager.
    pub async fn unmount(mut self) {
        debug!(match_id = %self.client.match_id(), "unmounting view");
        self.client.close().await;
    }

    /// Bring the landing-row cache up to date with `snapshot`.
    fn refresh_targets(&mut self, snapshot: &Arc<MatchSnapshot>) -> &DropTargets {
        let cached = match self.targets.take() {
            Some(cached) if Arc::ptr_eq(&cached.snapshot, snapshot) => cached,
            Some(mut cached) => {
                cached.targets.sync(&cached.snapshot, snapshot);
                cached.snapshot = Arc::clone(snapshot);
                cached
            }
            None => CachedTargets {
                snapshot: Arc::clone(snapshot),
                targets: DropTargets::new(&snapshot.board),
            },
        };
        &self.targets.insert(cached).targets
    }
}

impl std::fmt::Debug for MatchView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchView")
            .field("client", &self.client)
            .field("local_player", &self.local_player)
            .field("hovered_col", &self.hovered_col)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::{Connect4Error, Result};
    use crate::event::ConnectionState;
    use crate::gate::Rejection;
    use crate::identity::MemoryIdentityStore;
    use crate::protocol::Board;
    use crate::transport::{Connected, Transport};
    use async_trait::async_trait;
    use std::time::Duration;

    struct IdleTransport;

    #[async_trait]
    impl Transport for IdleTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct FixedSource(Option<MatchSnapshot>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self, _match_id: &str) -> Result<MatchSnapshot> {
            self.0.clone().ok_or(Connect4Error::Http { status: 404 })
        }
    }

    fn in_progress() -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board: Board::empty(3, 2),
            moves: vec![],
            move_number: 0,
            winner: None,
            next_player_to_move_username: Some("alice".into()),
            finished_at: None,
        }
    }

    async fn mounted(name: Option<&str>, snapshot: Option<MatchSnapshot>) -> MatchView {
        let identity = match name {
            Some(name) => MemoryIdentityStore::with_entry("m1", name),
            None => MemoryIdentityStore::new(),
        };
        let config = ClientConfig::new("http://api", "ws://ws");
        let (view, _events) = MatchView::mount(
            "m1",
            &identity,
            Connected::new(IdleTransport),
            FixedSource(snapshot),
            &config,
        );
        let mut state = view.client().subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| matches!(s, ConnectionState::Live | ConnectionState::Errored)),
        )
        .await
        .unwrap()
        .unwrap();
        view
    }

    #[tokio::test]
    async fn hover_highlights_landing_cell_for_current_player() {
        let mut view = mounted(Some("alice"), Some(in_progress())).await;

        assert!(view.hover(1));
        let Presentation::Board(board) = view.presentation() else {
            panic!("expected board");
        };
        assert!(board.can_act);
        assert_eq!(board.drop_target(), Some((2, 1)));
        assert_eq!(board.status, MatchStatus::YourTurn);
        assert_eq!(board.move_number, Some(0));

        view.leave();
        let Presentation::Board(board) = view.presentation() else {
            panic!("expected board");
        };
        assert_eq!(board.drop_target(), None);
        view.unmount().await;
    }

    #[tokio::test]
    async fn hover_does_not_stick_for_waiting_player() {
        let mut view = mounted(Some("bob"), Some(in_progress())).await;

        assert!(!view.hover(0));
        assert_eq!(view.hovered_col(), None);
        assert_eq!(
            view.click(0),
            Submission::Rejected(Rejection::NotYourTurn)
        );
        view.unmount().await;
    }

    #[tokio::test]
    async fn failed_bootstrap_shows_no_data() {
        let mut view = mounted(Some("alice"), None).await;
        assert_eq!(view.presentation(), Presentation::NoData);
        view.unmount().await;
    }

    #[tokio::test]
    async fn share_link_uses_match_id() {
        let view = mounted(Some("alice"), Some(in_progress())).await;
        assert_eq!(
            view.share_link("https://play.test/"),
            "https://play.test/games/m1/join/"
        );
        view.unmount().await;
    }
}
