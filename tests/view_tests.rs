//! Match view scenarios: what a mounted view presents and which interactions
//! it allows for a given snapshot and local identity.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use connect4_client::protocol::{Board, Cell, MatchSnapshot};
use connect4_client::{
    Connected, ConnectionState, MatchStatus, MatchView, MemoryIdentityStore, Presentation,
    Rejection, Submission,
};

use common::{
    after_move, config, init_tracing, new_match, wait_for_move_number, wait_for_state, MockSource,
    MockTransport, Remote, MATCH_ID,
};

fn mount(name: Option<&str>, source: MockSource) -> (MatchView, Remote) {
    init_tracing();
    let identity = match name {
        Some(name) => MemoryIdentityStore::with_entry(MATCH_ID, name),
        None => MemoryIdentityStore::new(),
    };
    let (transport, remote) = MockTransport::new();
    let (view, _events) =
        MatchView::mount(MATCH_ID, &identity, Connected::new(transport), source, &config());
    (view, remote)
}

async fn live_view(name: Option<&str>, snapshot: MatchSnapshot) -> (MatchView, Remote) {
    let (view, remote) = mount(name, MockSource::ok(snapshot));
    wait_for_state(view.client(), ConnectionState::Live).await;
    (view, remote)
}

fn board_view(view: &mut MatchView) -> connect4_client::view::BoardView {
    match view.presentation() {
        Presentation::Board(board) => board,
        other => panic!("expected a board, got {other:?}"),
    }
}

fn finished(winner: Option<u8>) -> MatchSnapshot {
    let mut snapshot = after_move(&new_match(), 0, Cell::Player1, "bob");
    snapshot.winner = winner;
    snapshot.finished_at = Some("2024-05-01T10:00:00Z".into());
    snapshot.next_player_to_move_username = None;
    snapshot
}

// ════════════════════════════════════════════════════════════════════
// Presentation states
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn loading_until_first_snapshot() {
    let (source, release) = MockSource::gated(Ok(new_match()));
    let (mut view, _remote) = mount(Some("alice"), source);
    wait_for_state(view.client(), ConnectionState::Bootstrapping).await;

    assert_eq!(view.presentation(), Presentation::Loading);

    release.notify_one();
    wait_for_state(view.client(), ConnectionState::Live).await;
    assert!(matches!(view.presentation(), Presentation::Board(_)));
    view.unmount().await;
}

#[tokio::test]
async fn failed_bootstrap_presents_no_data() {
    let (mut view, _remote) = mount(Some("alice"), MockSource::failing(404));
    wait_for_state(view.client(), ConnectionState::Errored).await;

    assert_eq!(view.presentation(), Presentation::NoData);
    view.unmount().await;
}

#[tokio::test]
async fn foreign_bootstrap_snapshot_presents_no_data() {
    let mut foreign = new_match();
    foreign.id = "other".into();
    let (mut view, _remote) = mount(Some("alice"), MockSource::ok(foreign));
    wait_for_state(view.client(), ConnectionState::Errored).await;

    assert_eq!(view.presentation(), Presentation::NoData);
    view.unmount().await;
}

#[tokio::test]
async fn dropping_view_closes_channel_once() {
    let (view, remote) = live_view(Some("alice"), new_match()).await;
    drop(view);

    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while remote.close_count() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("channel should be closed after the view is dropped");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(remote.close_count(), 1);
}

#[tokio::test]
async fn missing_identity_blocks_interaction() {
    let (mut view, remote) = live_view(None, new_match()).await;

    assert_eq!(view.local_player(), None);
    assert_eq!(view.presentation(), Presentation::MissingIdentity);
    assert!(!view.hover(0));
    assert_eq!(
        view.click(0),
        Submission::Rejected(Rejection::MissingIdentity)
    );
    assert!(remote.sent().is_empty());
    view.unmount().await;
}

#[tokio::test]
async fn single_cell_waiting_match_shows_waiting_state() {
    let snapshot = MatchSnapshot {
        id: MATCH_ID.into(),
        player1: "A".into(),
        player2: None,
        board: Board::empty(1, 1),
        moves: vec![],
        move_number: 0,
        winner: None,
        next_player_to_move_username: None,
        finished_at: None,
    };
    let (mut view, remote) = live_view(Some("A"), snapshot).await;

    assert_eq!(
        view.presentation(),
        Presentation::WaitingForOpponent {
            player1: "A".into()
        }
    );
    assert!(!view.hover(0));
    assert!(!view.click(0).is_queued());
    assert!(remote.sent().is_empty());
    assert_eq!(
        view.share_link("http://localhost:3000"),
        format!("http://localhost:3000/games/{MATCH_ID}/join/")
    );
    view.unmount().await;
}

#[tokio::test]
async fn draw_for_both_players() {
    for name in ["alice", "bob"] {
        let (mut view, _remote) = live_view(Some(name), finished(Some(0))).await;
        let board = board_view(&mut view);
        assert_eq!(board.status, MatchStatus::Draw);
        assert_eq!(board.status.to_string(), "It's a draw");
        assert_eq!(board.move_number, None);
        assert!(board.finished_at.is_some());
        assert!(!board.can_act);
        view.unmount().await;
    }
}

#[tokio::test]
async fn win_for_player1_is_loss_for_player2() {
    let (mut alice, _r1) = live_view(Some("alice"), finished(Some(1))).await;
    assert_eq!(board_view(&mut alice).status, MatchStatus::Won);

    let (mut bob, _r2) = live_view(Some("bob"), finished(Some(1))).await;
    assert_eq!(board_view(&mut bob).status, MatchStatus::Lost);
    assert_eq!(board_view(&mut bob).status.to_string(), "You lost!");

    alice.unmount().await;
    bob.unmount().await;
}

// ════════════════════════════════════════════════════════════════════
// Hover and click
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn hover_marks_only_the_landing_cell() {
    let start = after_move(&new_match(), 2, Cell::Player1, "bob");
    let start = after_move(&start, 2, Cell::Player2, "alice");
    let (mut view, _remote) = live_view(Some("alice"), start).await;

    assert!(view.hover(2));
    let board = board_view(&mut view);
    let marked: Vec<(usize, usize)> = board
        .cells
        .iter()
        .enumerate()
        .flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, cell)| cell.drop_target)
                .map(move |(c, _)| (r, c))
        })
        .collect();
    assert_eq!(marked, vec![(3, 2)]);
    assert_eq!(board.status, MatchStatus::YourTurn);

    view.leave();
    assert_eq!(board_view(&mut view).drop_target(), None);
    view.unmount().await;
}

#[tokio::test]
async fn drop_target_follows_pushed_moves() {
    let (mut view, remote) = live_view(Some("alice"), new_match()).await;
    assert!(view.hover(5));
    assert_eq!(board_view(&mut view).drop_target(), Some((5, 5)));

    // bob never moved, but the server says it is alice's turn again.
    let one = after_move(&new_match(), 5, Cell::Player1, "alice");
    remote.send_snapshot(&one);
    wait_for_move_number(view.client(), 1).await;
    assert_eq!(board_view(&mut view).drop_target(), Some((4, 5)));

    // Now it is bob's turn: alice's hover no longer shows anything.
    let two = after_move(&one, 5, Cell::Player1, "bob");
    remote.send_snapshot(&two);
    wait_for_move_number(view.client(), 2).await;
    let board = board_view(&mut view);
    assert_eq!(board.drop_target(), None);
    assert_eq!(
        board.status,
        MatchStatus::TheirTurn {
            player: Some("bob".into())
        }
    );
    view.unmount().await;
}

#[tokio::test]
async fn drop_target_rescans_columns_outside_the_recorded_move() {
    let (mut view, remote) = live_view(Some("alice"), new_match()).await;
    assert!(view.hover(1));
    assert_eq!(board_view(&mut view).drop_target(), Some((5, 1)));

    // The move record names column 0, but the board also gains a marker in column 1.
    let mut next = after_move(&new_match(), 0, Cell::Player1, "alice");
    let mut rows = next.board.rows().to_vec();
    rows[5][1] = Cell::Marker;
    next.board = Board::new(rows).unwrap();
    remote.send_snapshot(&next);
    wait_for_move_number(view.client(), 1).await;

    let board = board_view(&mut view);
    assert_eq!(board.drop_target(), Some((4, 1)));
    assert_eq!(board.cells[5][1].cell, Cell::Marker);
    assert!(!board.cells[5][1].drop_target);
    view.unmount().await;
}

#[tokio::test]
async fn click_sends_column_and_waits_for_push() {
    let (mut view, remote) = live_view(Some("alice"), new_match()).await;

    assert!(view.click(3).is_queued());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(remote.sent(), vec![r#"{"player":"alice","col":3}"#.to_string()]);

    // No optimistic placement.
    let board = board_view(&mut view);
    assert!(board.cells.iter().flatten().all(|c| c.cell == Cell::Empty));
    view.unmount().await;
}

#[tokio::test]
async fn full_column_is_rejected_locally() {
    let mut snapshot = new_match();
    for n in 0..6 {
        let (cell, next) = if n % 2 == 0 {
            (Cell::Player1, "bob")
        } else {
            (Cell::Player2, "alice")
        };
        snapshot = after_move(&snapshot, 0, cell, next);
    }
    let (mut view, remote) = live_view(Some("alice"), snapshot).await;

    assert!(view.hover(0));
    assert_eq!(board_view(&mut view).drop_target(), None);
    assert_eq!(view.click(0), Submission::Rejected(Rejection::ColumnFull));
    assert!(remote.sent().is_empty());
    view.unmount().await;
}
