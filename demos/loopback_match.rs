//! # Loopback Match Example
//!
//! Plays a short match against an in-process fake server. The server half
//! owns the authoritative snapshot, applies every move it receives, answers
//! with a pushed snapshot, and plays the opponent's reply itself.
//!
//! It shows how to:
//!
//! - implement [`Transport`] and [`SnapshotSource`] over in-process channels
//! - mount a [`MatchView`] with an injected identity store
//! - drive hover/click from [`Presentation`] and render the board
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_match
//! ```

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use connect4_client::protocol::{Board, Cell, MatchSnapshot, MoveRecord, MoveRequest};
use connect4_client::view::BoardView;
use connect4_client::{
    ClientConfig, Connect4Error, Connected, MatchEvent, MatchView, MemoryIdentityStore,
    Presentation, SnapshotSource, Transport,
};
use tokio::sync::mpsc;

const MATCH_ID: &str = "loopback";
const LOCAL: &str = "alice";
const OPPONENT: &str = "bob";
const LOCAL_COLUMN: usize = 3;
const OPPONENT_COLUMN: usize = 0;

// ─────────────────────────────────────────────────────────────────────
// Step 1: An in-process channel
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback.
struct LoopbackServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), Connect4Error> {
        self.tx
            .send(message)
            .map_err(|e| Connect4Error::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, Connect4Error>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), Connect4Error> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: The fake server's game state
// ─────────────────────────────────────────────────────────────────────

type SharedMatch = Arc<StdMutex<MatchSnapshot>>;

/// Bootstrap source reading the server's current snapshot.
struct LoopbackSource(SharedMatch);

#[async_trait]
impl SnapshotSource for LoopbackSource {
    async fn fetch(&self, _match_id: &str) -> Result<MatchSnapshot, Connect4Error> {
        Ok(self.0.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

fn new_match() -> MatchSnapshot {
    MatchSnapshot {
        id: MATCH_ID.into(),
        player1: LOCAL.into(),
        player2: Some(OPPONENT.into()),
        board: Board::empty(6, 7),
        moves: Vec::new(),
        move_number: 0,
        winner: None,
        next_player_to_move_username: Some(LOCAL.into()),
        finished_at: None,
    }
}

/// Drop a piece for `player`. Four in one column ends the match.
fn apply_move(snapshot: &MatchSnapshot, player: &str, col: usize) -> Option<MatchSnapshot> {
    let slot = snapshot.slot_of(player)?;
    let row = snapshot.board.landing_row(col)?;
    let mut rows = snapshot.board.rows().to_vec();
    *rows.get_mut(row)?.get_mut(col)? = slot.cell();
    let board = Board::new(rows).ok()?;

    let stacked = (row..board.height())
        .take_while(|&r| board.get(r, col) == Some(slot.cell()))
        .count();
    let won = stacked >= 4;

    let mut moves = snapshot.moves.clone();
    moves.push(MoveRecord {
        row,
        col,
        value: slot.cell(),
    });
    let next = if player == LOCAL { OPPONENT } else { LOCAL };

    Some(MatchSnapshot {
        board,
        moves,
        move_number: snapshot.move_number + 1,
        winner: won.then_some(if player == LOCAL { 1 } else { 2 }),
        next_player_to_move_username: (!won).then(|| next.to_owned()),
        finished_at: won.then(|| "2024-05-01T10:00:00Z".to_owned()),
        ..snapshot.clone()
    })
}

/// Apply every received move, push the result, and answer for the opponent.
async fn run_server(mut server: LoopbackServer, state: SharedMatch) {
    let mut double_encode = false;
    let mut push = |snapshot: &MatchSnapshot| -> bool {
        let Ok(json) = serde_json::to_string(snapshot) else {
            return false;
        };
        // Alternate encodings; the client accepts both.
        double_encode = !double_encode;
        let frame = if double_encode {
            serde_json::to_string(&json).unwrap_or(json)
        } else {
            json
        };
        server.tx.send(frame).is_ok()
    };

    while let Some(text) = server.rx.recv().await {
        let Ok(request) = serde_json::from_str::<MoveRequest>(&text) else {
            tracing::warn!("server: ignoring {text}");
            continue;
        };
        tracing::info!("server: {} drops into column {}", request.player, request.col);

        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for (player, col) in [(request.player.as_str(), request.col), (OPPONENT, OPPONENT_COLUMN)] {
            if current.is_finished() {
                break;
            }
            let Some(next) = apply_move(&current, player, col) else {
                tracing::warn!("server: illegal move by {player}");
                break;
            };
            current = next;
            *state.lock().unwrap_or_else(PoisonError::into_inner) = current.clone();
            if !push(&current) {
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Render and play
// ─────────────────────────────────────────────────────────────────────

fn render(board: &BoardView) -> String {
    let mut out = String::new();
    for row in &board.cells {
        for cell in row {
            let glyph = match cell.cell {
                _ if cell.drop_target => '*',
                Cell::Empty => '.',
                Cell::Player1 => 'X',
                Cell::Player2 => 'O',
                Cell::Marker => '#',
            };
            out.push(glyph);
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state: SharedMatch = Arc::new(StdMutex::new(new_match()));
    let (transport, server) = loopback_pair();
    let server_task = tokio::spawn(run_server(server, Arc::clone(&state)));

    let identity = MemoryIdentityStore::with_entry(MATCH_ID, LOCAL);
    let config = ClientConfig::new("http://loopback", "ws://loopback");
    let (mut view, mut events) = MatchView::mount(
        MATCH_ID,
        &identity,
        Connected::new(transport),
        LoopbackSource(Arc::clone(&state)),
        &config,
    );

    while let Some(event) = events.recv().await {
        match event {
            MatchEvent::SnapshotReplaced(_) | MatchEvent::StateChanged(_) => {}
            MatchEvent::Closed { reason } => {
                tracing::info!("closed: {}", reason.as_deref().unwrap_or("by server"));
                break;
            }
            other => {
                tracing::warn!("event: {other:?}");
                continue;
            }
        }

        let Presentation::Board(board) = view.presentation() else {
            continue;
        };
        println!("{}", board.status);
        if board.status.is_terminal() {
            println!("{}", render(&board));
            break;
        }
        if board.can_act && view.hover(LOCAL_COLUMN) {
            if let Presentation::Board(hovered) = view.presentation() {
                println!("{}", render(&hovered));
            }
            let outcome = view.click(LOCAL_COLUMN);
            tracing::info!("click on column {LOCAL_COLUMN}: {outcome:?}");
            view.leave();
        }
    }

    view.unmount().await;
    server_task.abort();
    Ok(())
}
