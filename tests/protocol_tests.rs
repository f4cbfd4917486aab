#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests.
//!
//! Verifies decoding of snapshot fixtures shaped like real server output,
//! both encodings of pushed frames, and the outbound move message.

use connect4_client::protocol::{
    decode_snapshot, Board, Cell, MatchSnapshot, MoveRecord, MoveRequest, PlayerSlot,
};
use connect4_client::turn::{match_status, resolve_next_player, MatchStatus};
use connect4_client::Connect4Error;

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

/// A match three moves in, as served by `GET /games/{id}/`.
const IN_PROGRESS: &str = r#"{
    "id": "6f1c2a",
    "player1": "alice",
    "player2": "bob",
    "board": [
        [0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 2, 0, 0, 0],
        [0, 0, 0, 1, 1, 0, 0]
    ],
    "moves": [
        {"row": 5, "col": 3, "val": 1},
        {"row": 4, "col": 3, "val": 2},
        {"row": 5, "col": 4, "val": 1}
    ],
    "move_number": 3,
    "winner": null,
    "next_player_to_move_username": "bob",
    "finished_at": null
}"#;

/// A freshly created match nobody has joined yet.
const WAITING: &str = r#"{
    "id": "x",
    "player1": "A",
    "player2": null,
    "board": [[0]],
    "moves": [],
    "move_number": 0,
    "winner": null,
    "next_player_to_move_username": null,
    "finished_at": null
}"#;

fn finished(winner: serde_json::Value) -> MatchSnapshot {
    let mut value: serde_json::Value = serde_json::from_str(IN_PROGRESS).unwrap();
    value["winner"] = winner;
    value["finished_at"] = serde_json::json!("2024-05-01T10:00:00.000Z");
    value["next_player_to_move_username"] = serde_json::Value::Null;
    serde_json::from_value(value).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Snapshot decoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn in_progress_fixture_decodes() {
    let snapshot = decode_snapshot(IN_PROGRESS).unwrap();

    assert_eq!(snapshot.id, "6f1c2a");
    assert_eq!(snapshot.player2.as_deref(), Some("bob"));
    assert_eq!(snapshot.board.height(), 6);
    assert_eq!(snapshot.board.width(), 7);
    assert_eq!(snapshot.board.get(4, 3), Some(Cell::Player2));
    assert_eq!(snapshot.board.occupied_count(), 3);
    assert_eq!(snapshot.moves.len(), snapshot.move_number as usize);
    assert_eq!(
        snapshot.moves[2],
        MoveRecord {
            row: 5,
            col: 4,
            value: Cell::Player1
        }
    );
    assert!(!snapshot.is_finished());
}

#[test]
fn double_encoded_frame_yields_inner_snapshot() {
    let wrapped = serde_json::to_string(IN_PROGRESS).unwrap();
    assert!(wrapped.starts_with('"'));

    let single = decode_snapshot(IN_PROGRESS).unwrap();
    let double = decode_snapshot(&wrapped).unwrap();
    assert_eq!(single, double);
}

#[test]
fn waiting_fixture_has_no_second_player() {
    let snapshot = decode_snapshot(WAITING).unwrap();
    assert!(snapshot.is_waiting_for_opponent());
    assert_eq!(match_status(&snapshot, "A"), MatchStatus::WaitingForOpponent);
}

#[test]
fn optional_fields_may_be_omitted() {
    let snapshot =
        decode_snapshot(r#"{"id":"m","player1":"a","board":[[0,0],[0,3]]}"#).unwrap();
    assert_eq!(snapshot.player2, None);
    assert!(snapshot.moves.is_empty());
    assert_eq!(snapshot.move_number, 0);
    assert_eq!(snapshot.board.get(1, 1), Some(Cell::Marker));
}

#[test]
fn malformed_frames_are_serialization_errors() {
    let cases = [
        "",
        "not json",
        "42",
        r#""not json either""#,
        r#""\"42\"""#,
        r#"{"id":"m","player1":"a","board":[[0,0],[0]]}"#,
        r#"{"id":"m","player1":"a","board":[[0,4]]}"#,
        r#"{"id":"m","board":[[0]]}"#,
    ];
    for case in cases {
        let err = decode_snapshot(case).unwrap_err();
        assert!(
            matches!(err, Connect4Error::Serialization(_)),
            "expected serialization error for {case:?}, got {err:?}"
        );
    }
}

#[test]
fn board_serializes_back_to_cell_codes() {
    let board = Board::new(vec![vec![Cell::Empty, Cell::Player1], vec![Cell::Player2, Cell::Marker]])
        .unwrap();
    assert_eq!(serde_json::to_string(&board).unwrap(), "[[0,1],[2,3]]");
}

// ════════════════════════════════════════════════════════════════════
// Outcome and turn fields
// ════════════════════════════════════════════════════════════════════

#[test]
fn authoritative_next_player_wins_over_board() {
    let snapshot = decode_snapshot(IN_PROGRESS).unwrap();
    // Three pieces would mean player2 by parity; the field agrees here.
    assert_eq!(resolve_next_player(&snapshot), Some("bob"));

    let mut overridden = snapshot.clone();
    overridden.next_player_to_move_username = Some("alice".into());
    assert_eq!(resolve_next_player(&overridden), Some("alice"));
}

#[test]
fn missing_next_player_falls_back_to_parity() {
    let mut snapshot = decode_snapshot(IN_PROGRESS).unwrap();
    snapshot.next_player_to_move_username = None;
    assert_eq!(resolve_next_player(&snapshot), Some("bob"));
}

#[test]
fn falsy_winner_with_finished_at_is_draw_for_both() {
    for winner in [
        serde_json::Value::Null,
        serde_json::json!(0),
        serde_json::json!(false),
    ] {
        let snapshot = finished(winner);
        assert_eq!(match_status(&snapshot, "alice"), MatchStatus::Draw);
        assert_eq!(match_status(&snapshot, "bob"), MatchStatus::Draw);
    }
}

#[test]
fn winner_one_is_win_for_player1_and_loss_for_player2() {
    let snapshot = finished(serde_json::json!(1));
    assert_eq!(snapshot.winning_slot(), Some(PlayerSlot::One));
    assert_eq!(match_status(&snapshot, "alice"), MatchStatus::Won);
    assert_eq!(match_status(&snapshot, "bob"), MatchStatus::Lost);
    assert_eq!(match_status(&snapshot, "alice").to_string(), "You won!");
}

// ════════════════════════════════════════════════════════════════════
// Outbound move
// ════════════════════════════════════════════════════════════════════

#[test]
fn move_request_carries_player_and_column_only() {
    let request = MoveRequest {
        player: "alice".into(),
        col: 6,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value, serde_json::json!({ "player": "alice", "col": 6 }));
    assert!(value.get("row").is_none());
}
