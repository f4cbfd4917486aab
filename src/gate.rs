//! Input gating for move submission.
//!
//! Moves are checked locally before anything reaches the network. A rejected
//! move is not an error: it is logged and reported as
//! [`Submission::Rejected`], and nothing is sent. The board is never mutated
//! optimistically; the next authoritative push carries the result.

use std::fmt;

use crate::event::ConnectionState;
use crate::protocol::{MatchSnapshot, MoveRequest};
use crate::turn::is_turn_of;

/// Returns `true` iff the match is unfinished and `local_player` moves next.
pub fn can_act(snapshot: &MatchSnapshot, local_player: &str) -> bool {
    !snapshot.is_finished() && is_turn_of(snapshot, local_player)
}

/// Why a move was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No display name is stored for this match.
    MissingIdentity,
    /// No snapshot has been received yet.
    NoSnapshot,
    /// The persistent channel is not live.
    NotConnected,
    /// The match already has a terminal outcome.
    Finished,
    /// The second seat is still empty.
    WaitingForOpponent,
    /// Someone else moves next.
    NotYourTurn,
    /// The column does not exist on this board.
    ColumnOutOfRange,
    /// The column has no empty cell left.
    ColumnFull,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::MissingIdentity => "no player name for this match",
            Rejection::NoSnapshot => "no match data yet",
            Rejection::NotConnected => "channel not connected",
            Rejection::Finished => "match is finished",
            Rejection::WaitingForOpponent => "waiting for an opponent",
            Rejection::NotYourTurn => "not your turn",
            Rejection::ColumnOutOfRange => "column out of range",
            Rejection::ColumnFull => "column is full",
        };
        f.write_str(text)
    }
}

/// Outcome of a move submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The move was handed to the connection for transmission.
    Queued,
    /// The move was dropped locally.
    Rejected(Rejection),
}

impl Submission {
    /// Returns `true` for [`Submission::Queued`].
    pub fn is_queued(self) -> bool {
        self == Submission::Queued
    }
}

/// Check every precondition for dropping a piece into `col`.
///
/// On success returns the [`MoveRequest`] to transmit. The check order is
/// fixed: identity, data, connection, outcome, opponent, turn, column.
pub fn authorize(
    snapshot: Option<&MatchSnapshot>,
    local_player: Option<&str>,
    connection: ConnectionState,
    col: usize,
) -> Result<MoveRequest, Rejection> {
    let player = local_player.ok_or(Rejection::MissingIdentity)?;
    let snapshot = snapshot.ok_or(Rejection::NoSnapshot)?;
    if connection != ConnectionState::Live {
        return Err(Rejection::NotConnected);
    }
    if snapshot.is_finished() {
        return Err(Rejection::Finished);
    }
    if snapshot.is_waiting_for_opponent() {
        return Err(Rejection::WaitingForOpponent);
    }
    if !is_turn_of(snapshot, player) {
        return Err(Rejection::NotYourTurn);
    }
    if col >= snapshot.board.width() {
        return Err(Rejection::ColumnOutOfRange);
    }
    if snapshot.board.is_column_full(col) {
        return Err(Rejection::ColumnFull);
    }
    Ok(MoveRequest {
        player: player.to_owned(),
        col,
    })
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
    use crate::protocol::{Board, Cell};

    fn snapshot() -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board: Board::new(vec![
                vec![Cell::Empty, Cell::Player2],
                vec![Cell::Empty, Cell::Player1],
            ])
            .unwrap(),
            moves: vec![],
            move_number: 2,
            winner: None,
            next_player_to_move_username: Some("alice".into()),
            finished_at: None,
        }
    }

    #[test]
    fn can_act_requires_turn_and_unfinished() {
        let mut s = snapshot();
        assert!(can_act(&s, "alice"));
        assert!(!can_act(&s, "bob"));

        s.finished_at = Some("2024-05-01T10:00:00Z".into());
        assert!(!can_act(&s, "alice"));
    }

    #[test]
    fn authorize_builds_move_without_row() {
        let s = snapshot();
        let req = authorize(Some(&s), Some("alice"), ConnectionState::Live, 0).unwrap();
        assert_eq!(
            req,
            MoveRequest {
                player: "alice".into(),
                col: 0
            }
        );
    }

    #[test]
    fn authorize_rejections() {
        let s = snapshot();
        let live = ConnectionState::Live;

        assert_eq!(
            authorize(Some(&s), None, live, 0),
            Err(Rejection::MissingIdentity)
        );
        assert_eq!(
            authorize(None, Some("alice"), live, 0),
            Err(Rejection::NoSnapshot)
        );
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Bootstrapping,
            ConnectionState::Errored,
            ConnectionState::Closed,
        ] {
            assert_eq!(
                authorize(Some(&s), Some("alice"), state, 0),
                Err(Rejection::NotConnected)
            );
        }
        assert_eq!(
            authorize(Some(&s), Some("bob"), live, 0),
            Err(Rejection::NotYourTurn)
        );
        assert_eq!(
            authorize(Some(&s), Some("alice"), live, 2),
            Err(Rejection::ColumnOutOfRange)
        );
        assert_eq!(
            authorize(Some(&s), Some("alice"), live, 1),
            Err(Rejection::ColumnFull)
        );

        let mut finished = snapshot();
        finished.finished_at = Some("2024-05-01T10:00:00Z".into());
        assert_eq!(
            authorize(Some(&finished), Some("alice"), live, 0),
            Err(Rejection::Finished)
        );

        let mut waiting = snapshot();
        waiting.player2 = None;
        assert_eq!(
            authorize(Some(&waiting), Some("alice"), live, 0),
            Err(Rejection::WaitingForOpponent)
        );
    }
}
