#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the integration tests.
//!
//! Provides a channel-driven [`MockTransport`], a [`MockSource`] whose fetch
//! can be held back, and snapshot fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use connect4_client::protocol::{Board, Cell, MatchSnapshot, MoveRecord};
use connect4_client::{
    ConnectionState, Connect4Error, Connector, MatchClient, MatchEvent, SnapshotSource, Transport,
};
use tokio::sync::{mpsc, Notify};

pub const MATCH_ID: &str = "m1";
pub const TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

// ── MockTransport ───────────────────────────────────────────────────

/// Transport fed by a channel the test holds.
///
/// Each value sent through [`Remote::push`] is returned by one `recv()`.
/// Dropping the remote's sender ends the stream cleanly.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, Connect4Error>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

/// The test's side of a [`MockTransport`].
pub struct Remote {
    pub push: mpsc::UnboundedSender<Result<String, Connect4Error>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closes: Arc<AtomicUsize>,
}

impl Remote {
    pub fn send_text(&self, text: impl Into<String>) {
        self.push.send(Ok(text.into())).unwrap();
    }

    pub fn send_snapshot(&self, snapshot: &MatchSnapshot) {
        self.send_text(serde_json::to_string(snapshot).unwrap());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl MockTransport {
    pub fn new() -> (Self, Remote) {
        let (push, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            incoming,
            sent: Arc::clone(&sent),
            closes: Arc::clone(&closes),
        };
        (transport, Remote { push, sent, closes })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), Connect4Error> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, Connect4Error>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), Connect4Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector whose handshake always fails.
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, Connect4Error> {
        Err(Connect4Error::Io(std::io::Error::other("connection refused")))
    }
}

// ── MockSource ──────────────────────────────────────────────────────

/// Snapshot source answering with a fixed result, optionally held until released.
pub struct MockSource {
    result: StdMutex<Option<Result<MatchSnapshot, Connect4Error>>>,
    gate: Option<Arc<Notify>>,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn ok(snapshot: MatchSnapshot) -> Self {
        Self::with_result(Ok(snapshot))
    }

    pub fn failing(status: u16) -> Self {
        Self::with_result(Err(Connect4Error::Http { status }))
    }

    /// Fetch waits until the returned [`Notify`] is notified.
    pub fn gated(result: Result<MatchSnapshot, Connect4Error>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let source = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::with_result(result)
        };
        (source, gate)
    }

    fn with_result(result: Result<MatchSnapshot, Connect4Error>) -> Self {
        Self {
            result: StdMutex::new(Some(result)),
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn fetch(&self, _match_id: &str) -> Result<MatchSnapshot, Connect4Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(Connect4Error::Fetch("fetched twice".into())))
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// Fresh 6x7 match between alice and bob, alice to move.
pub fn new_match() -> MatchSnapshot {
    MatchSnapshot {
        id: MATCH_ID.into(),
        player1: "alice".into(),
        player2: Some("bob".into()),
        board: Board::empty(6, 7),
        moves: vec![],
        move_number: 0,
        winner: None,
        next_player_to_move_username: Some("alice".into()),
        finished_at: None,
    }
}

/// `previous` with one more `cell` dropped into `col`.
pub fn after_move(previous: &MatchSnapshot, col: usize, cell: Cell, next: &str) -> MatchSnapshot {
    let row = previous.board.landing_row(col).unwrap();
    let mut rows = previous.board.rows().to_vec();
    rows[row][col] = cell;
    let mut moves = previous.moves.clone();
    moves.push(MoveRecord {
        row,
        col,
        value: cell,
    });
    MatchSnapshot {
        board: Board::new(rows).unwrap(),
        moves,
        move_number: previous.move_number + 1,
        next_player_to_move_username: Some(next.into()),
        ..previous.clone()
    }
}

/// Snapshot as the server encodes it, wrapped in one extra JSON string layer.
pub fn double_encoded(snapshot: &MatchSnapshot) -> String {
    let inner = serde_json::to_string(snapshot).unwrap();
    serde_json::to_string(&inner).unwrap()
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn config() -> connect4_client::ClientConfig {
    connect4_client::ClientConfig::new("http://api.test", "ws://ws.test")
        .with_shutdown_timeout(Duration::from_millis(500))
}

pub async fn wait_for_state(client: &MatchClient, state: ConnectionState) {
    let mut rx = client.subscribe_state();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("state {state} not reached"))
        .unwrap();
}

pub async fn wait_for_move_number(client: &MatchClient, move_number: u32) {
    let mut rx = client.subscribe();
    tokio::time::timeout(
        TIMEOUT,
        rx.wait_for(|s| s.as_ref().is_some_and(|s| s.move_number == move_number)),
    )
    .await
    .unwrap_or_else(|_| panic!("move {move_number} not reached"))
    .unwrap();
}

/// Receive events until one matches `pred`.
pub async fn next_matching<F>(events: &mut mpsc::Receiver<MatchEvent>, mut pred: F) -> MatchEvent
where
    F: FnMut(&MatchEvent) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
