//! Connection manager for one match.
//!
//! [`MatchClient`] is a thin handle over a background event processor. The
//! processor owns the persistent channel, performs the bootstrap fetch once
//! the channel is open, and replaces the board model on every accepted push.
//! All state transitions happen on that one task, in the order events arrive.
//!
//! The board model is published through a [`tokio::sync::watch`] channel as
//! `Option<Arc<MatchSnapshot>>`. A replacement swaps the whole `Arc`, so a
//! reader never sees fields from two different snapshots.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let connector = WebSocketConnector::for_match(&config, "abc");
//! let source = HttpSnapshotSource::new(&config)?;
//! let (mut client, mut events) = MatchClient::start("abc", connector, source, &config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         MatchEvent::SnapshotReplaced(snapshot) => { /* redraw */ }
//!         MatchEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.close().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::event::{ConnectionState, MatchEvent};
use crate::fetch::SnapshotSource;
use crate::gate::{self, Rejection, Submission};
use crate::protocol::{decode_snapshot, MatchSnapshot, MoveRequest};
use crate::transport::{Connector, Transport};

/// Reason attached to the final event after a local close.
const CLIENT_CLOSED: &str = "client closed";

// ── Shared state ────────────────────────────────────────────────────

/// State written by the event processor and read by the handle.
struct Shared {
    snapshot: watch::Sender<Option<Arc<MatchSnapshot>>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            snapshot: watch::Sender::new(None),
            state: watch::Sender::new(ConnectionState::Connecting),
        }
    }

    /// Move to `next`, returning `true` if the state changed.
    fn set_state(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        })
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to the connection manager of one match view.
///
/// Created with [`MatchClient::start`]. One instance serves exactly one match
/// identifier and is never reused. Dropping the handle signals the event
/// processor to close the channel and aborts it after the shutdown timeout;
/// call [`close`](Self::close) to wait for the teardown.
pub struct MatchClient {
    match_id: String,
    cmd_tx: mpsc::UnboundedSender<MoveRequest>,
    shared: Arc<Shared>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl MatchClient {
    /// Spawn the event processor for `match_id` and return the handle plus
    /// the event receiver.
    ///
    /// The processor opens the channel through `connector`, then fetches the
    /// initial snapshot from `source` exactly once.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C, S>(
        match_id: impl Into<String>,
        connector: C,
        source: S,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<MatchEvent>)
    where
        C: Connector,
        S: SnapshotSource,
    {
        let match_id = match_id.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<MoveRequest>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<MatchEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(Shared::new());

        let processor = EventLoop {
            match_id: match_id.clone(),
            cmd_rx,
            event_tx,
            shared: Arc::clone(&shared),
            shutdown_rx,
        };
        let task = tokio::spawn(processor.run(connector, source));

        let client = Self {
            match_id,
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Identifier of the match this client serves.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// The current board model, `None` until the first snapshot is applied.
    pub fn snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.shared.snapshot.borrow().clone()
    }

    /// Watch the board model. Each change is one whole snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MatchSnapshot>>> {
        self.shared.snapshot.subscribe()
    }

    /// Watch the connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Returns `true` if `local_player` may move on the current snapshot.
    pub fn can_act(&self, local_player: &str) -> bool {
        self.snapshot()
            .is_some_and(|snapshot| gate::can_act(&snapshot, local_player))
    }

    // ── Moves ───────────────────────────────────────────────────────

    /// Submit a move into `col` on behalf of `local_player`.
    ///
    /// The move is queued only if [`gate::authorize`] passes against the
    /// current snapshot and the channel is live. Otherwise nothing is sent and
    /// the rejection is logged and returned. The board is not touched; the
    /// result arrives with the next push.
    pub fn submit_move(&self, local_player: Option<&str>, col: usize) -> Submission {
        let snapshot = self.snapshot();
        let state = self.connection_state();

        let request = match gate::authorize(snapshot.as_deref(), local_player, state, col) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(match_id = %self.match_id, col, %rejection, "move rejected locally");
                return Submission::Rejected(rejection);
            }
        };

        debug!(match_id = %self.match_id, player = %request.player, col, "queueing move");
        if self.cmd_tx.send(request).is_err() {
            warn!(match_id = %self.match_id, "event processor stopped, move dropped");
            return Submission::Rejected(Rejection::NotConnected);
        }
        Submission::Queued
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Close the channel and stop the event processor.
    ///
    /// Idempotent: the transport is closed at most once however often this
    /// is called. A pending bootstrap fetch is dropped with the processor and
    /// can no longer update the model.
    pub async fn close(&mut self) {
        debug!(match_id = %self.match_id, "close requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("event processor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("event processor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("event processor aborted: {join_err}");
                    }
                }
            }
        }

        if !self.connection_state().is_terminal() {
            self.shared.set_state(ConnectionState::Closed);
        }
    }

    /// Returns `true` once the client reached `Closed` or `Errored`.
    pub fn is_closed(&self) -> bool {
        self.connection_state().is_terminal()
    }
}

impl std::fmt::Debug for MatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchClient")
            .field("match_id", &self.match_id)
            .field("state", &self.connection_state())
            .field("has_snapshot", &self.shared.snapshot.borrow().is_some())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for MatchClient {
    fn drop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        // Ask the processor to close the channel, then abort it if it has not
        // exited within the shutdown timeout.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let timeout = self.shutdown_timeout;
                handle.spawn(async move {
                    if tokio::time::timeout(timeout, &mut task).await.is_err() {
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}

// ── Event processor ─────────────────────────────────────────────────

/// Everything the event processor owns besides the connector and source.
struct EventLoop {
    match_id: String,
    cmd_rx: mpsc::UnboundedReceiver<MoveRequest>,
    event_tx: mpsc::Sender<MatchEvent>,
    shared: Arc<Shared>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl EventLoop {
    /// Drive the state machine until the channel closes, a terminal error
    /// occurs, or a close is requested.
    async fn run<C: Connector, S: SnapshotSource>(mut self, connector: C, source: S) {
        debug!(match_id = %self.match_id, "event processor started");

        // ── Connecting ──────────────────────────────────────────────
        let connected = tokio::select! {
            result = connector.connect() => result,
            _ = &mut self.shutdown_rx => {
                self.transition(ConnectionState::Closed).await;
                self.emit_closed(Some(CLIENT_CLOSED.into())).await;
                return;
            }
        };

        let mut transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                error!(match_id = %self.match_id, "channel handshake failed: {e}");
                self.transition(ConnectionState::Errored).await;
                self.emit_closed(Some(format!("channel handshake failed: {e}")))
                    .await;
                return;
            }
        };

        // ── Bootstrapping ───────────────────────────────────────────
        self.transition(ConnectionState::Bootstrapping).await;
        let match_id = self.match_id.clone();
        let mut fetch = source.fetch(&match_id);
        let mut fetch_pending = true;

        // ── Live ────────────────────────────────────────────────────
        let reason = loop {
            tokio::select! {
                result = &mut fetch, if fetch_pending => {
                    fetch_pending = false;
                    let outcome = match result {
                        Ok(snapshot) => {
                            info!(match_id = %self.match_id, move_number = snapshot.move_number, "bootstrap snapshot received");
                            let seeded_before = self.shared.snapshot.borrow().is_some();
                            if self.apply(snapshot).await || seeded_before {
                                Ok(())
                            } else {
                                Err("bootstrap snapshot rejected".to_owned())
                            }
                        }
                        Err(e) => {
                            error!(match_id = %self.match_id, "bootstrap fetch failed: {e}");
                            Err(format!("bootstrap fetch failed: {e}"))
                        }
                    };
                    match outcome {
                        Ok(()) => self.transition(ConnectionState::Live).await,
                        Err(reason) => {
                            self.emit(MatchEvent::BootstrapFailed { reason: reason.clone() }).await;
                            if self.shared.snapshot.borrow().is_some() {
                                info!(match_id = %self.match_id, "already seeded by a push, continuing");
                                self.transition(ConnectionState::Live).await;
                            } else {
                                self.transition(ConnectionState::Errored).await;
                                if let Err(close_err) = transport.close().await {
                                    debug!("channel close after bootstrap failure: {close_err}");
                                }
                                break Some(reason);
                            }
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(request) => self.send_move(&mut transport, &request).await,
                        // Every sender is gone; nobody can observe us anymore.
                        None => {
                            let _ = transport.close().await;
                            self.transition(ConnectionState::Closed).await;
                            break Some(CLIENT_CLOSED.into());
                        }
                    }
                }

                _ = &mut self.shutdown_rx => {
                    debug!(match_id = %self.match_id, "close signal received");
                    if let Err(e) = transport.close().await {
                        debug!("channel close failed: {e}");
                    }
                    self.transition(ConnectionState::Closed).await;
                    break Some(CLIENT_CLOSED.into());
                }

                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => self.handle_push(&text).await,
                        Some(Err(e)) => {
                            error!(match_id = %self.match_id, "channel error: {e}");
                            self.emit(MatchEvent::TransportError { reason: e.to_string() }).await;
                        }
                        None => {
                            debug!(match_id = %self.match_id, "channel closed by server");
                            self.transition(ConnectionState::Closed).await;
                            break None;
                        }
                    }
                }
            }
        };

        self.emit_closed(reason).await;
        debug!(match_id = %self.match_id, "event processor exited");
    }

    /// Decode and apply one pushed frame. Malformed frames are logged and dropped.
    async fn handle_push(&self, text: &str) {
        match decode_snapshot(text) {
            Ok(snapshot) => {
                debug!(match_id = %self.match_id, move_number = snapshot.move_number, "push received");
                self.apply(snapshot).await;
            }
            Err(e) => {
                warn!(match_id = %self.match_id, "dropping malformed push: {e}; raw: {text}");
                self.emit(MatchEvent::SnapshotRejected {
                    reason: format!("malformed push: {e}"),
                })
                .await;
            }
        }
    }

    /// Replace the board model with `next` unless it would break an invariant.
    ///
    /// Returns `true` if `next` is now the board model.
    async fn apply(&self, next: MatchSnapshot) -> bool {
        let verdict = {
            let current = self.shared.snapshot.borrow();
            check_replacement(&self.match_id, current.as_deref(), &next)
        };
        match verdict {
            Ok(()) => {
                let next = Arc::new(next);
                self.shared.snapshot.send_replace(Some(Arc::clone(&next)));
                self.emit(MatchEvent::SnapshotReplaced(next)).await;
                true
            }
            Err(reason) => {
                warn!(match_id = %self.match_id, "keeping previous snapshot: {reason}");
                self.emit(MatchEvent::SnapshotRejected { reason }).await;
                false
            }
        }
    }

    async fn send_move(&self, transport: &mut impl Transport, request: &MoveRequest) {
        let json = match serde_json::to_string(request) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize move: {e}");
                return;
            }
        };
        debug!(match_id = %self.match_id, "sending move: {json}");
        if let Err(e) = transport.send(json).await {
            error!(match_id = %self.match_id, "failed to send move: {e}");
            self.emit(MatchEvent::TransportError {
                reason: e.to_string(),
            })
            .await;
        }
    }

    async fn transition(&self, next: ConnectionState) {
        if self.shared.set_state(next) {
            debug!(match_id = %self.match_id, state = %next, "connection state changed");
            self.emit(MatchEvent::StateChanged(next)).await;
        }
    }

    /// Emit an event without blocking. A full channel drops the event with a warning.
    async fn emit(&self, event: MatchEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit the final [`MatchEvent::Closed`], waiting for room if needed.
    async fn emit_closed(&self, reason: Option<String>) {
        if self
            .event_tx
            .send(MatchEvent::Closed { reason })
            .await
            .is_err()
        {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Decide whether `next` may replace `current` for the view of `match_id`.
///
/// Rejects snapshots of another match, a regressing `move_number`, a cleared
/// `finished_at`, and a `player2` that disappears again.
fn check_replacement(
    match_id: &str,
    current: Option<&MatchSnapshot>,
    next: &MatchSnapshot,
) -> Result<(), String> {
    if next.id != match_id {
        return Err(format!(
            "snapshot for match {} does not belong to match {match_id}",
            next.id
        ));
    }
    let Some(current) = current else {
        return Ok(());
    };
    if next.move_number < current.move_number {
        return Err(format!(
            "stale snapshot: move {} is behind move {}",
            next.move_number, current.move_number
        ));
    }
    if current.is_finished() && !next.is_finished() {
        return Err("snapshot reopens a finished match".into());
    }
    if current.player2.is_some() && next.player2.is_none() {
        return Err("snapshot drops the second player".into());
    }
    Ok(())
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
    use crate::error::{Connect4Error, Result};
    use crate::protocol::Board;
    use crate::transport::Connected;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Records sent frames and replays scripted inbound frames, then hangs.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedSource(Option<MatchSnapshot>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self, _match_id: &str) -> Result<MatchSnapshot> {
            self.0.clone().ok_or(Connect4Error::Http { status: 500 })
        }
    }

    fn snapshot(move_number: u32) -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            player1: "alice".into(),
            player2: Some("bob".into()),
            board: Board::empty(2, 2),
            moves: vec![],
            move_number,
            winner: None,
            next_player_to_move_username: Some("alice".into()),
            finished_at: None,
        }
    }

    fn start(
        incoming: Vec<Option<Result<String>>>,
        source: FixedSource,
    ) -> (
        MatchClient,
        mpsc::Receiver<MatchEvent>,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicUsize>,
    ) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = MockTransport {
            incoming: incoming.into(),
            sent: Arc::clone(&sent),
            closes: Arc::clone(&closes),
        };
        let config = ClientConfig::new("http://api", "ws://ws");
        let (client, events) =
            MatchClient::start("m1", Connected::new(transport), source, &config);
        (client, events, sent, closes)
    }

    async fn wait_for_state(client: &MatchClient, state: ConnectionState) {
        let mut rx = client.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached in time")
            .unwrap();
    }

    #[test]
    fn replacement_rules() {
        let current = snapshot(3);

        assert!(check_replacement("m1", None, &current).is_ok());
        assert!(check_replacement("m1", Some(&current), &snapshot(3)).is_ok());
        assert!(check_replacement("m1", Some(&current), &snapshot(4)).is_ok());
        assert!(check_replacement("m1", Some(&current), &snapshot(2)).is_err());
        assert!(check_replacement("other", None, &current).is_err());

        let mut finished = snapshot(5);
        finished.finished_at = Some("2024-05-01T10:00:00Z".into());
        assert!(check_replacement("m1", Some(&finished), &snapshot(6)).is_err());

        let mut waiting = snapshot(4);
        waiting.player2 = None;
        assert!(check_replacement("m1", Some(&current), &waiting).is_err());
    }

    #[tokio::test]
    async fn bootstrap_seeds_model_and_goes_live() {
        let (mut client, mut events, _sent, _closes) =
            start(vec![], FixedSource(Some(snapshot(0))));

        assert!(matches!(
            events.recv().await.unwrap(),
            MatchEvent::StateChanged(ConnectionState::Bootstrapping)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MatchEvent::SnapshotReplaced(_)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MatchEvent::StateChanged(ConnectionState::Live)
        ));
        assert_eq!(client.snapshot().unwrap().move_number, 0);

        client.close().await;
    }

    #[tokio::test]
    async fn submit_sends_move_when_permitted() {
        let (mut client, _events, sent, _closes) = start(vec![], FixedSource(Some(snapshot(0))));
        wait_for_state(&client, ConnectionState::Live).await;

        assert_eq!(client.submit_move(Some("alice"), 1), Submission::Queued);
        assert_eq!(
            client.submit_move(Some("bob"), 1),
            Submission::Rejected(Rejection::NotYourTurn)
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let messages = sent.lock().unwrap().clone();
        assert_eq!(messages, vec![r#"{"player":"alice","col":1}"#.to_string()]);

        client.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut client, _events, _sent, closes) = start(vec![], FixedSource(Some(snapshot(0))));
        wait_for_state(&client, ConnectionState::Live).await;

        client.close().await;
        client.close().await;

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(client.connection_state(), ConnectionState::Closed);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn debug_impl() {
        let (mut client, _events, _sent, _closes) = start(vec![], FixedSource(Some(snapshot(0))));
        let debug = format!("{client:?}");
        assert!(debug.contains("MatchClient"));
        assert!(debug.contains("m1"));
        client.close().await;
    }
}
