//! Turn resolution and match status.
//!
//! The server's `next_player_to_move_username` is authoritative. Only when it
//! is absent does the client fall back to board parity, which assumes strict
//! alternation starting with `player1` and no retracted pieces.

use std::fmt;

use crate::protocol::{Board, MatchSnapshot, PlayerSlot};

/// Display name of whoever must move next.
///
/// Returns the authoritative field verbatim when present. Otherwise counts
/// occupied cells: even means `player1`, odd means `player2`. The fallback
/// yields `None` when it lands on a `player2` that has not joined yet.
pub fn resolve_next_player(snapshot: &MatchSnapshot) -> Option<&str> {
    if let Some(name) = snapshot.next_player_to_move_username.as_deref() {
        return Some(name);
    }
    snapshot.player_name(fallback_slot(&snapshot.board))
}

/// Parity-based guess of the seat to move. Degraded accuracy, never authoritative.
pub fn fallback_slot(board: &Board) -> PlayerSlot {
    if board.occupied_count() % 2 == 0 {
        PlayerSlot::One
    } else {
        PlayerSlot::Two
    }
}

/// Returns `true` if the resolved next mover is `local_player`.
///
/// Does not look at `finished_at`; see [`crate::gate::can_act`] for that.
pub fn is_turn_of(snapshot: &MatchSnapshot, local_player: &str) -> bool {
    resolve_next_player(snapshot) == Some(local_player)
}

/// Status of a match from the local player's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStatus {
    /// No second player yet.
    WaitingForOpponent,
    YourTurn,
    /// Someone else must move. `player` is `None` if no mover can be resolved.
    TheirTurn { player: Option<String> },
    Won,
    Lost,
    Draw,
}

impl MatchStatus {
    /// Returns `true` for the three terminal outcomes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Won | MatchStatus::Lost | MatchStatus::Draw)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::WaitingForOpponent => f.write_str("Waiting for player to join"),
            MatchStatus::YourTurn => f.write_str("It's your turn"),
            MatchStatus::TheirTurn { player: Some(name) } => write!(f, "It's {name}'s turn"),
            MatchStatus::TheirTurn { player: None } => f.write_str("Waiting for the next move"),
            MatchStatus::Won => f.write_str("You won!"),
            MatchStatus::Lost => f.write_str("You lost!"),
            MatchStatus::Draw => f.write_str("It's a draw"),
        }
    }
}

/// Derive the status shown to `local_player`.
///
/// `finished_at` decides whether the match is over; `winner` only picks the
/// outcome. A finished match with a falsy winner is a draw for both players.
/// The outcome is never re-derived from the board.
pub fn match_status(snapshot: &MatchSnapshot, local_player: &str) -> MatchStatus {
    if snapshot.is_finished() {
        return match snapshot.winning_slot() {
            None => MatchStatus::Draw,
            Some(slot) if snapshot.player_name(slot) == Some(local_player) => MatchStatus::Won,
            Some(_) => MatchStatus::Lost,
        };
    }
    if snapshot.is_waiting_for_opponent() {
        return MatchStatus::WaitingForOpponent;
    }
    match resolve_next_player(snapshot) {
        Some(name) if name == local_player => MatchStatus::YourTurn,
        other => MatchStatus::TheirTurn {
            player: other.map(str::to_owned),
        },
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
    use crate::protocol::Cell;

    fn snapshot(cells: Vec<Vec<Cell>>) -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board: Board::new(cells).unwrap(),
            moves: vec![],
            move_number: 0,
            winner: None,
            next_player_to_move_username: None,
            finished_at: None,
        }
    }

    #[test]
    fn authoritative_field_wins_over_parity() {
        let mut s = snapshot(vec![vec![Cell::Empty, Cell::Empty]]);
        // Parity says alice, server says bob.
        s.next_player_to_move_username = Some("bob".into());
        assert_eq!(resolve_next_player(&s), Some("bob"));

        // Even an unknown name is returned verbatim.
        s.next_player_to_move_username = Some("carol".into());
        assert_eq!(resolve_next_player(&s), Some("carol"));
    }

    #[test]
    fn parity_fallback() {
        let even = snapshot(vec![vec![Cell::Player1, Cell::Player2, Cell::Empty]]);
        assert_eq!(resolve_next_player(&even), Some("alice"));

        let odd = snapshot(vec![vec![Cell::Player1, Cell::Empty, Cell::Empty]]);
        assert_eq!(resolve_next_player(&odd), Some("bob"));
    }

    #[test]
    fn parity_fallback_counts_markers() {
        let s = snapshot(vec![vec![Cell::Marker, Cell::Empty]]);
        assert_eq!(fallback_slot(&s.board), PlayerSlot::Two);
    }

    #[test]
    fn fallback_to_missing_player2_is_none() {
        let mut s = snapshot(vec![vec![Cell::Player1, Cell::Empty]]);
        s.player2 = None;
        assert_eq!(resolve_next_player(&s), None);
    }

    #[test]
    fn draw_for_both_players() {
        let mut s = snapshot(vec![vec![Cell::Player1, Cell::Player2]]);
        s.finished_at = Some("2024-05-01T10:00:00Z".into());
        s.winner = Some(0);
        assert_eq!(match_status(&s, "alice"), MatchStatus::Draw);
        assert_eq!(match_status(&s, "bob"), MatchStatus::Draw);

        s.winner = None;
        assert_eq!(match_status(&s, "alice"), MatchStatus::Draw);
    }

    #[test]
    fn win_and_loss() {
        let mut s = snapshot(vec![vec![Cell::Player1, Cell::Player2]]);
        s.finished_at = Some("2024-05-01T10:00:00Z".into());
        s.winner = Some(1);
        assert_eq!(match_status(&s, "alice"), MatchStatus::Won);
        assert_eq!(match_status(&s, "bob"), MatchStatus::Lost);

        s.winner = Some(2);
        assert_eq!(match_status(&s, "alice"), MatchStatus::Lost);
        assert_eq!(match_status(&s, "bob"), MatchStatus::Won);
    }

    #[test]
    fn winner_without_finished_at_is_not_terminal() {
        let mut s = snapshot(vec![vec![Cell::Empty, Cell::Empty]]);
        s.winner = Some(1);
        assert_eq!(match_status(&s, "alice"), MatchStatus::YourTurn);
    }

    #[test]
    fn turn_statuses() {
        let s = snapshot(vec![vec![Cell::Empty, Cell::Empty]]);
        assert_eq!(match_status(&s, "alice"), MatchStatus::YourTurn);
        assert_eq!(
            match_status(&s, "bob"),
            MatchStatus::TheirTurn {
                player: Some("alice".into())
            }
        );
        assert_eq!(match_status(&s, "bob").to_string(), "It's alice's turn");
    }

    #[test]
    fn waiting_for_opponent() {
        let mut s = snapshot(vec![vec![Cell::Empty]]);
        s.player2 = None;
        assert_eq!(match_status(&s, "alice"), MatchStatus::WaitingForOpponent);
        assert!(!match_status(&s, "alice").is_terminal());
    }
}
