//! # Terminal Match Example
//!
//! Joins a live match and plays it from the terminal:
//!
//! 1. Read the API and channel origins from the environment
//! 2. Look up (or store) the local player name for the match
//! 3. Mount a view over WebSocket + HTTP bootstrap
//! 4. Redraw on every pushed snapshot; type a column number to move
//! 5. Unmount on Ctrl+C, on end of input, or when the match ends
//!
//! ## Running
//!
//! ```sh
//! export CONNECT4_API_BASE_URL=http://localhost:8000
//! export CONNECT4_WS_BASE_URL=ws://localhost:8000
//!
//! # First time: remember the name you joined with.
//! cargo run --example terminal_match -- <match-id> alice
//!
//! # Later: the stored name is used.
//! cargo run --example terminal_match -- <match-id>
//! ```

use connect4_client::view::BoardView;
use connect4_client::{
    ClientConfig, IdentityStore, JsonFileIdentityStore, MatchEvent, MatchView, Presentation,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default identity file when `CONNECT4_IDENTITY_FILE` is not set.
const DEFAULT_IDENTITY_FILE: &str = "connect4-names.json";

/// Origin used for the share link.
const DEFAULT_WEB_ORIGIN: &str = "http://localhost:3000";

fn draw(board: &BoardView) {
    println!("{} vs {}", board.player1, board.player2);
    for row in &board.cells {
        let line: Vec<String> = row
            .iter()
            .map(|cell| {
                if cell.drop_target {
                    "*".to_owned()
                } else {
                    u8::from(cell.cell).to_string()
                }
            })
            .collect();
        println!("  {}", line.join(" "));
    }
    let header: Vec<String> = (0..board.cells.first().map_or(0, Vec::len))
        .map(|c| c.to_string())
        .collect();
    println!("  {}", header.join(" "));
    match board.move_number {
        Some(n) => println!("{} (move {n})", board.status),
        None => println!(
            "{} (finished {})",
            board.status,
            board.finished_at.as_deref().unwrap_or("?")
        ),
    }
}

/// Print the current presentation. Returns `true` once the match is over.
fn redraw(view: &mut MatchView, origin: &str) -> bool {
    match view.presentation() {
        Presentation::Loading => println!("Loading..."),
        Presentation::NoData => println!("No game data available"),
        Presentation::MissingIdentity => {
            println!("No player name found. Please rejoin the game.");
        }
        Presentation::WaitingForOpponent { player1 } => {
            println!("{player1} is waiting for a player to join");
            println!("Share this link: {}", view.share_link(origin));
        }
        Presentation::Board(board) => {
            draw(&board);
            return board.status.is_terminal();
        }
    }
    false
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let Some(match_id) = args.next() else {
        return Err("usage: terminal_match <match-id> [player-name]".into());
    };
    let config = ClientConfig::from_env()?;
    let origin =
        std::env::var("CONNECT4_WEB_ORIGIN").unwrap_or_else(|_| DEFAULT_WEB_ORIGIN.to_owned());

    // ── Identity ────────────────────────────────────────────────────
    let path = std::env::var("CONNECT4_IDENTITY_FILE")
        .unwrap_or_else(|_| DEFAULT_IDENTITY_FILE.to_owned());
    let identity = JsonFileIdentityStore::new(path);
    if let Some(name) = args.next() {
        identity.set_player_name(&match_id, &name)?;
    }

    // ── Mount ───────────────────────────────────────────────────────
    let (mut view, mut events) = MatchView::connect(&match_id, &identity, &config)?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(MatchEvent::Closed { reason }) => {
                        tracing::info!("channel closed: {}", reason.as_deref().unwrap_or("by server"));
                        redraw(&mut view, &origin);
                        break;
                    }
                    None => break,
                    Some(MatchEvent::BootstrapFailed { reason }) => {
                        tracing::error!("bootstrap failed: {reason}");
                    }
                    Some(_) => {
                        if redraw(&mut view, &origin) {
                            break;
                        }
                    }
                }
            }

            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim().parse::<usize>() {
                    Ok(col) => {
                        view.hover(col);
                        let outcome = view.click(col);
                        println!("column {col}: {outcome:?}");
                        view.leave();
                    }
                    Err(_) => println!("type a column number"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving the match");
                break;
            }
        }
    }

    view.unmount().await;
    Ok(())
}
