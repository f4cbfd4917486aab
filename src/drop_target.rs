//! Drop-target calculation for hover feedback.
//!
//! A drop target is the single cell a move would occupy if submitted now.
//! Columns are gravity-fed, so in a hovered column only the empty cell with
//! the highest row index qualifies, and only while the local player can act.
//!
//! [`is_drop_target`] answers one query by scanning the column. [`DropTargets`]
//! caches the landing row of every column so per-cell queries during a redraw
//! are O(1), and rescans only the columns whose cells changed between two
//! boards.

use crate::gate::can_act;
use crate::protocol::{Board, Cell, MatchSnapshot};

/// Per-render inputs shared by every cell query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropContext {
    /// Column under the pointer, if any.
    pub hovered_col: Option<usize>,
    /// Whether the local player may move right now (unfinished and their turn).
    pub can_act: bool,
}

impl DropContext {
    /// Build the context for `local_player` viewing `snapshot`.
    pub fn new(
        snapshot: &MatchSnapshot,
        local_player: Option<&str>,
        hovered_col: Option<usize>,
    ) -> Self {
        Self {
            hovered_col,
            can_act: local_player.is_some_and(|name| can_act(snapshot, name)),
        }
    }
}

/// Returns `true` if `(row, col)` is where a move in the hovered column would land.
///
/// Requires: the cell is empty, the local player can act, `col` is hovered, and
/// no empty cell sits below it in the same column. O(rows).
pub fn is_drop_target(board: &Board, row: usize, col: usize, ctx: DropContext) -> bool {
    if !ctx.can_act || ctx.hovered_col != Some(col) {
        return false;
    }
    board.get(row, col) == Some(Cell::Empty) && board.landing_row(col) == Some(row)
}

/// Cached landing row for every column of one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTargets {
    landing: Vec<Option<usize>>,
}

impl DropTargets {
    /// Scan every column of `board`.
    pub fn new(board: &Board) -> Self {
        Self {
            landing: (0..board.width()).map(|col| board.landing_row(col)).collect(),
        }
    }

    /// Number of columns tracked.
    pub fn width(&self) -> usize {
        self.landing.len()
    }

    /// Landing row of `col`; `None` if full or out of range.
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        self.landing.get(col).copied().flatten()
    }

    /// Same answer as [`is_drop_target`], from the cache.
    ///
    /// `board` must be the board the cache was last synced to; the cell is
    /// still checked for emptiness so an occupied cell is never marked.
    pub fn is_drop_target(
        &self,
        board: &Board,
        row: usize,
        col: usize,
        ctx: DropContext,
    ) -> bool {
        ctx.can_act
            && ctx.hovered_col == Some(col)
            && self.landing_row(col) == Some(row)
            && board.get(row, col) == Some(Cell::Empty)
    }

    /// The highlighted cell for `ctx`, if any.
    pub fn target(&self, ctx: DropContext) -> Option<(usize, usize)> {
        if !ctx.can_act {
            return None;
        }
        let col = ctx.hovered_col?;
        self.landing_row(col).map(|row| (row, col))
    }

    /// Rescan `col` of `board`.
    pub fn refresh_column(&mut self, board: &Board, col: usize) {
        if let Some(slot) = self.landing.get_mut(col) {
            *slot = board.landing_row(col);
        }
    }

    /// Bring the cache in line with `next`, given the snapshot it was built from.
    ///
    /// On a same-sized board only columns whose cells differ are rescanned;
    /// the move history is not consulted. A reshaped board rescans everything.
    pub fn sync(&mut self, previous: &MatchSnapshot, next: &MatchSnapshot) {
        let (before, after) = (&previous.board, &next.board);
        if before.height() != after.height()
            || before.width() != after.width()
            || after.width() != self.landing.len()
        {
            *self = Self::new(after);
            return;
        }
        for col in 0..after.width() {
            if column_changed(before, after, col) {
                self.refresh_column(after, col);
            }
        }
    }
}

fn column_changed(before: &Board, after: &Board, col: usize) -> bool {
    (0..after.height()).any(|row| before.get(row, col) != after.get(row, col))
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
    use crate::protocol::MoveRecord;

    // 0 . . .
    // 1 . X .
    // 2 . X O
    fn board() -> Board {
        Board::new(vec![
            vec![Cell::Empty, Cell::Empty, Cell::Empty],
            vec![Cell::Empty, Cell::Player1, Cell::Empty],
            vec![Cell::Empty, Cell::Player1, Cell::Player2],
        ])
        .unwrap()
    }

    fn hovering(col: usize) -> DropContext {
        DropContext {
            hovered_col: Some(col),
            can_act: true,
        }
    }

    fn highlighted(board: &Board, ctx: DropContext) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for row in 0..board.height() {
            for col in 0..board.width() {
                if is_drop_target(board, row, col, ctx) {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    #[test]
    fn only_lowest_empty_cell_of_hovered_column() {
        let b = board();
        assert_eq!(highlighted(&b, hovering(0)), vec![(2, 0)]);
        assert_eq!(highlighted(&b, hovering(1)), vec![(0, 1)]);
        assert_eq!(highlighted(&b, hovering(2)), vec![(1, 2)]);
    }

    #[test]
    fn nothing_without_hover_or_permission() {
        let b = board();
        assert!(highlighted(&b, DropContext::default()).is_empty());
        let ctx = DropContext {
            hovered_col: Some(0),
            can_act: false,
        };
        assert!(highlighted(&b, ctx).is_empty());
    }

    #[test]
    fn occupied_cells_never_marked() {
        let b = board();
        assert!(!is_drop_target(&b, 1, 1, hovering(1)));
        assert!(!is_drop_target(&b, 2, 2, hovering(2)));
    }

    #[test]
    fn full_column_has_no_target() {
        let b = Board::new(vec![vec![Cell::Player1], vec![Cell::Player2]]).unwrap();
        assert!(highlighted(&b, hovering(0)).is_empty());
        assert_eq!(DropTargets::new(&b).target(hovering(0)), None);
    }

    #[test]
    fn cache_agrees_with_scan() {
        let b = board();
        let cache = DropTargets::new(&b);
        for col in 0..b.width() {
            let ctx = hovering(col);
            for row in 0..b.height() {
                assert_eq!(
                    cache.is_drop_target(&b, row, col, ctx),
                    is_drop_target(&b, row, col, ctx),
                    "mismatch at ({row}, {col})"
                );
            }
        }
        assert_eq!(cache.target(hovering(2)), Some((1, 2)));
    }

    fn snapshot_with(board: Board, move_number: u32) -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board,
            moves: vec![],
            move_number,
            winner: None,
            next_player_to_move_username: Some("alice".into()),
            finished_at: None,
        }
    }

    #[test]
    fn sync_refreshes_changed_column() {
        let before = snapshot_with(board(), 3);
        let mut cache = DropTargets::new(&before.board);

        let mut rows = before.board.rows().to_vec();
        rows[2][0] = Cell::Player2;
        let after = snapshot_with(Board::new(rows).unwrap(), 4);
        cache.sync(&before, &after);

        assert_eq!(cache, DropTargets::new(&after.board));
        assert_eq!(cache.landing_row(0), Some(1));
    }

    #[test]
    fn sync_ignores_move_history() {
        let before = snapshot_with(Board::empty(6, 7), 0);
        let mut cache = DropTargets::new(&before.board);

        // The recorded move says column 0, but column 1 also changed.
        let mut rows = before.board.rows().to_vec();
        rows[5][0] = Cell::Player1;
        rows[5][1] = Cell::Marker;
        let mut after = snapshot_with(Board::new(rows).unwrap(), 1);
        after.moves = vec![MoveRecord {
            row: 5,
            col: 0,
            value: Cell::Player1,
        }];
        cache.sync(&before, &after);

        assert_eq!(cache, DropTargets::new(&after.board));
        assert_eq!(cache.target(hovering(1)), Some((4, 1)));
        assert!(!cache.is_drop_target(&after.board, 5, 1, hovering(1)));
    }

    #[test]
    fn stale_cache_never_marks_occupied_cell() {
        let empty = Board::empty(2, 1);
        let cache = DropTargets::new(&empty);
        let filled = Board::new(vec![vec![Cell::Empty], vec![Cell::Marker]]).unwrap();
        assert!(!cache.is_drop_target(&filled, 1, 0, hovering(0)));
    }

    #[test]
    fn drop_context_from_snapshot() {
        let snapshot = MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board: board(),
            moves: vec![],
            move_number: 3,
            winner: None,
            next_player_to_move_username: Some("bob".into()),
            finished_at: None,
        };
        assert!(DropContext::new(&snapshot, Some("bob"), Some(0)).can_act);
        assert!(!DropContext::new(&snapshot, Some("alice"), Some(0)).can_act);
        assert!(!DropContext::new(&snapshot, None, Some(0)).can_act);
    }
}
