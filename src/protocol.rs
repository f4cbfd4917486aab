//! Wire-compatible types for the Connect Four game API.
//!
//! A [`MatchSnapshot`] is the single authoritative description of a match. It
//! arrives once from the bootstrap fetch and then on every push over the
//! persistent channel, always as a whole object. The only outbound message is
//! a [`MoveRequest`].
//!
//! Key adaptations from the server's JSON:
//!
//! - cell codes `0..=3` → [`Cell`]
//! - the nested `board` array → [`Board`], rejected unless rectangular
//! - `finished_at` stays a `String` (ISO 8601), the client never does date math on it

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Connect4Error, Result};

// ── Cells ───────────────────────────────────────────────────────────

/// Contents of one board cell.
///
/// Serialized as the server's integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Cell {
    /// Code `0`.
    #[default]
    Empty,
    /// Code `1`, a piece owned by `player1`.
    Player1,
    /// Code `2`, a piece owned by `player2`.
    Player2,
    /// Code `3`, reserved by the server for special markers.
    Marker,
}

impl Cell {
    /// Returns `true` for [`Cell::Empty`].
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Cell::Empty),
            1 => Ok(Cell::Player1),
            2 => Ok(Cell::Player2),
            3 => Ok(Cell::Marker),
            other => Err(format!("unknown cell code {other}")),
        }
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => 0,
            Cell::Player1 => 1,
            Cell::Player2 => 2,
            Cell::Marker => 3,
        }
    }
}

// ── Board ───────────────────────────────────────────────────────────

/// A rectangular grid of [`Cell`]s, row `0` at the top.
///
/// Columns are gravity-fed: a piece dropped into column `j` lands on the
/// empty cell with the highest row index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Cell>>", into = "Vec<Vec<Cell>>")]
pub struct Board {
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl Board {
    /// Build a board from rows, rejecting ragged input.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::InvalidSnapshot`] if the rows differ in length.
    pub fn new(rows: Vec<Vec<Cell>>) -> Result<Self> {
        Self::try_from(rows).map_err(Connect4Error::InvalidSnapshot)
    }

    /// An all-empty board with the given dimensions.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            rows: vec![vec![Cell::Empty; width]; height],
            width,
        }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The cell at `(row, col)`, or `None` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Rows from top to bottom.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Count of non-empty cells across the whole board.
    pub fn occupied_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|cell| !cell.is_empty())
            .count()
    }

    /// The row a piece dropped into `col` would land on.
    ///
    /// This is the empty cell with the highest row index; `None` when the
    /// column is full or out of range. Scans the column, O(rows).
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= self.width {
            return None;
        }
        self.rows
            .iter()
            .enumerate()
            .rev()
            .find(|(_, row)| row.get(col).is_some_and(|cell| cell.is_empty()))
            .map(|(index, _)| index)
    }

    /// Returns `true` if `col` exists and has no empty cell left.
    pub fn is_column_full(&self, col: usize) -> bool {
        col < self.width && self.landing_row(col).is_none()
    }
}

impl TryFrom<Vec<Vec<Cell>>> for Board {
    type Error = String;

    fn try_from(rows: Vec<Vec<Cell>>) -> std::result::Result<Self, Self::Error> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(format!(
                "board is not rectangular: row {index} has {} cells, expected {width}",
                row.len()
            ));
        }
        Ok(Self { rows, width })
    }
}

impl From<Board> for Vec<Vec<Cell>> {
    fn from(board: Board) -> Self {
        board.rows
    }
}

// ── Players ─────────────────────────────────────────────────────────

/// One of the two seats in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerSlot {
    /// `player1`, always moves first.
    One,
    /// `player2`, absent until someone joins.
    Two,
}

impl PlayerSlot {
    /// Map the server's winner code to a slot. `0` and unknown codes map to `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PlayerSlot::One),
            2 => Some(PlayerSlot::Two),
            _ => None,
        }
    }

    /// The cell value this seat's pieces carry.
    pub fn cell(self) -> Cell {
        match self {
            PlayerSlot::One => Cell::Player1,
            PlayerSlot::Two => Cell::Player2,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// One applied move in the match history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub row: usize,
    pub col: usize,
    /// Cell value the move produced.
    #[serde(rename = "val")]
    pub value: Cell,
}

/// The authoritative state of one match, as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Opaque match identifier.
    pub id: String,
    pub player1: String,
    /// `None` while waiting for the second participant.
    #[serde(default)]
    pub player2: Option<String>,
    pub board: Board,
    /// Applied moves, oldest first. Diagnostic only.
    #[serde(default)]
    pub moves: Vec<MoveRecord>,
    #[serde(default)]
    pub move_number: u32,
    /// `None` or `Some(0)` for no winner, otherwise the winning slot code.
    /// A boolean `false` on the wire reads as `Some(0)`.
    #[serde(default, deserialize_with = "winner_code")]
    pub winner: Option<u8>,
    #[serde(default)]
    pub next_player_to_move_username: Option<String>,
    /// Set once the match reached a terminal outcome.
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Winner as it may appear on the wire: a slot code or a falsy flag.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireWinner {
    Code(u8),
    Flag(bool),
}

fn winner_code<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireWinner>::deserialize(deserializer)? {
        None => Ok(None),
        Some(WireWinner::Code(code)) => Ok(Some(code)),
        Some(WireWinner::Flag(false)) => Ok(Some(0)),
        Some(WireWinner::Flag(true)) => Err(serde::de::Error::custom(
            "winner `true` does not name a seat",
        )),
    }
}

impl MatchSnapshot {
    /// Returns `true` once `finished_at` is set. Draws count as finished.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Returns `true` while no second player has joined.
    pub fn is_waiting_for_opponent(&self) -> bool {
        self.player2.is_none()
    }

    /// The winning seat, if the server recorded one.
    pub fn winning_slot(&self) -> Option<PlayerSlot> {
        self.winner.and_then(PlayerSlot::from_code)
    }

    /// Display name of the given seat.
    pub fn player_name(&self, slot: PlayerSlot) -> Option<&str> {
        match slot {
            PlayerSlot::One => Some(self.player1.as_str()),
            PlayerSlot::Two => self.player2.as_deref(),
        }
    }

    /// The seat occupied by `name`, checking `player1` first.
    pub fn slot_of(&self, name: &str) -> Option<PlayerSlot> {
        if self.player1 == name {
            Some(PlayerSlot::One)
        } else if self.player2.as_deref() == Some(name) {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }
}

/// Outbound move. The landing row is never sent; the server computes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Display name of the acting player.
    pub player: String,
    pub col: usize,
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decode a pushed text frame into a [`MatchSnapshot`].
///
/// Some upstreams wrap the snapshot in an extra JSON string layer. If the first
/// decode yields a string, it is decoded once more; otherwise the structured
/// value is used directly.
///
/// # Errors
///
/// Returns [`Connect4Error::Serialization`] if either layer is not valid JSON or
/// the result does not have the snapshot shape.
pub fn decode_snapshot(text: &str) -> Result<MatchSnapshot> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let value = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
        structured => structured,
    };
    Ok(serde_json::from_value(value)?)
}

// ── Tests ───────────────────────────────────────────────────────────

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

    fn board(codes: &[&[u8]]) -> Board {
        let rows = codes
            .iter()
            .map(|row| row.iter().map(|c| Cell::try_from(*c).unwrap()).collect())
            .collect();
        Board::new(rows).unwrap()
    }

    #[test]
    fn cell_codes_map_both_ways() {
        for code in 0u8..=3 {
            let cell = Cell::try_from(code).unwrap();
            assert_eq!(u8::from(cell), code);
        }
        assert!(Cell::try_from(4).is_err());
    }

    #[test]
    fn ragged_board_is_rejected() {
        let rows = vec![vec![Cell::Empty; 3], vec![Cell::Empty; 2]];
        let err = Board::new(rows).unwrap_err();
        assert!(matches!(err, Connect4Error::InvalidSnapshot(_)));
    }

    #[test]
    fn ragged_board_fails_to_deserialize() {
        let result = serde_json::from_str::<Board>("[[0,0],[0]]");
        assert!(result.is_err());
    }

    #[test]
    fn landing_row_is_lowest_empty_cell() {
        let b = board(&[&[0, 0, 1], &[0, 2, 1], &[1, 1, 2]]);
        assert_eq!(b.landing_row(0), Some(1));
        assert_eq!(b.landing_row(1), Some(0));
        assert_eq!(b.landing_row(2), None);
        assert_eq!(b.landing_row(3), None);
        assert!(b.is_column_full(2));
        assert!(!b.is_column_full(3));
    }

    #[test]
    fn occupied_count_includes_markers() {
        let b = board(&[&[0, 3], &[1, 2]]);
        assert_eq!(b.occupied_count(), 3);
    }

    #[test]
    fn get_out_of_range_is_none() {
        let b = Board::empty(2, 2);
        assert_eq!(b.get(1, 1), Some(Cell::Empty));
        assert_eq!(b.get(2, 0), None);
        assert_eq!(b.get(0, 2), None);
    }

    #[test]
    fn decode_accepts_single_encoding() {
        let text = r#"{"id":"x","player1":"A","player2":null,"board":[[0]],"moves":[],
            "move_number":0,"winner":null,"next_player_to_move_username":null,"finished_at":null}"#;
        let snapshot = decode_snapshot(text).unwrap();
        assert_eq!(snapshot.id, "x");
        assert!(snapshot.is_waiting_for_opponent());
    }

    #[test]
    fn decode_unwraps_double_encoding() {
        let inner = r#"{"id":"x","player1":"A","player2":"B","board":[[0,1]],"move_number":1}"#;
        let outer = serde_json::to_string(inner).unwrap();
        assert!(outer.starts_with('"'));

        let snapshot = decode_snapshot(&outer).unwrap();
        assert_eq!(snapshot.player2.as_deref(), Some("B"));
        assert_eq!(snapshot.board.get(0, 1), Some(Cell::Player1));
    }

    #[test]
    fn decode_rejects_garbage_and_wrong_shapes() {
        assert!(decode_snapshot("not json").is_err());
        assert!(decode_snapshot("42").is_err());
        assert!(decode_snapshot(r#""still not json""#).is_err());
        assert!(decode_snapshot(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn winner_zero_has_no_winning_slot() {
        let text = r#"{"id":"x","player1":"A","player2":"B","board":[[1,2]],
            "winner":0,"finished_at":"2024-05-01T10:00:00Z"}"#;
        let snapshot = decode_snapshot(text).unwrap();
        assert!(snapshot.is_finished());
        assert_eq!(snapshot.winning_slot(), None);
    }

    #[test]
    fn winner_false_reads_as_no_winner() {
        let text = r#"{"id":"x","player1":"A","player2":"B","board":[[1,2]],
            "winner":false,"finished_at":"2024-05-01T10:00:00Z"}"#;
        let snapshot = decode_snapshot(text).unwrap();
        assert_eq!(snapshot.winner, Some(0));
        assert_eq!(snapshot.winning_slot(), None);

        let text = r#"{"id":"x","player1":"A","board":[[0]],"winner":true}"#;
        assert!(decode_snapshot(text).is_err());
    }

    #[test]
    fn slot_lookup_by_name() {
        let text = r#"{"id":"x","player1":"A","player2":"B","board":[[0]]}"#;
        let snapshot = decode_snapshot(text).unwrap();
        assert_eq!(snapshot.slot_of("A"), Some(PlayerSlot::One));
        assert_eq!(snapshot.slot_of("B"), Some(PlayerSlot::Two));
        assert_eq!(snapshot.slot_of("C"), None);
        assert_eq!(snapshot.player_name(PlayerSlot::Two), Some("B"));
    }

    #[test]
    fn move_request_wire_shape() {
        let json = serde_json::to_value(MoveRequest {
            player: "A".into(),
            col: 3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "player": "A", "col": 3 }));
    }
}
