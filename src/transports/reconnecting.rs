//! Reconnect-with-backoff behind the [`Transport`] interface.
//!
//! [`Reconnecting`] wraps any [`Connector`]. The transport it produces re-runs
//! the inner handshake when the channel ends or fails, sleeping according to
//! a [`Backoff`] between attempts. The connection manager keeps seeing one
//! continuous [`Transport`] and needs no knowledge of the retries.
//!
//! Server pushes sent while the channel was down are not replayed; the next
//! push after a reconnect replaces the board model as usual.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Connect4Error;
use crate::transport::{Connector, Transport};

/// Default delay before the first reconnect attempt.
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Default upper bound for a single delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff schedule: `initial * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before attempt `1`.
    pub initial: Duration,
    /// Largest delay ever returned.
    pub max: Duration,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DELAY,
            max: DEFAULT_MAX_DELAY,
            max_attempts: Some(8),
        }
    }
}

impl Backoff {
    /// Set the delay before the first attempt.
    #[must_use]
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Set the attempt limit.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before `attempt` (1-based). Attempt `0` has no delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Returns `true` if `attempt` is within the limit.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// A [`Connector`] whose transports reconnect through `inner`.
#[derive(Debug, Clone)]
pub struct Reconnecting<C> {
    inner: C,
    backoff: Backoff,
}

impl<C: Connector + Clone> Reconnecting<C> {
    /// Wrap `inner` with the given schedule.
    pub fn new(inner: C, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }
}

#[async_trait]
impl<C: Connector + Clone> Connector for Reconnecting<C> {
    type Transport = ReconnectingTransport<C>;

    /// The first handshake is not retried; a failure here belongs to the
    /// caller's `Connecting` phase.
    async fn connect(&self) -> Result<Self::Transport, Connect4Error> {
        let current = self.inner.connect().await?;
        Ok(ReconnectingTransport {
            connector: self.inner.clone(),
            backoff: self.backoff.clone(),
            current: Some(current),
            attempt: 0,
            retry_at: None,
            closed: false,
        })
    }
}

/// Transport produced by [`Reconnecting`].
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe as long as the inner transport's
/// is. The retry deadline is stored on the struct, so a cancelled backoff
/// sleep resumes towards the same deadline. An attempt is only counted once
/// its handshake completes; a cancelled handshake is retried immediately with
/// the same attempt number.
pub struct ReconnectingTransport<C: Connector> {
    connector: C,
    backoff: Backoff,
    current: Option<C::Transport>,
    attempt: u32,
    retry_at: Option<Instant>,
    closed: bool,
}

impl<C: Connector> ReconnectingTransport<C> {
    /// Returns `true` while an inner transport is open.
    pub fn is_connected(&self) -> bool {
        self.current.is_some()
    }

    /// Consecutive failed reconnect attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl<C: Connector> std::fmt::Debug for ReconnectingTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingTransport")
            .field("connected", &self.current.is_some())
            .field("attempt", &self.attempt)
            .field("closed", &self.closed)
            .finish()
    }
}

#[async_trait]
impl<C: Connector> Transport for ReconnectingTransport<C> {
    async fn send(&mut self, message: String) -> Result<(), Connect4Error> {
        if self.closed {
            return Err(Connect4Error::TransportClosed);
        }
        match self.current.as_mut() {
            Some(transport) => transport.send(message).await,
            None => Err(Connect4Error::NotConnected),
        }
    }

    async fn recv(&mut self) -> Option<Result<String, Connect4Error>> {
        loop {
            if self.closed {
                return None;
            }

            if let Some(transport) = self.current.as_mut() {
                match transport.recv().await {
                    Some(Ok(text)) => {
                        self.attempt = 0;
                        return Some(Ok(text));
                    }
                    Some(Err(e)) => {
                        warn!("channel error, reconnecting: {e}");
                        self.current = None;
                    }
                    None => {
                        debug!("channel ended, reconnecting");
                        self.current = None;
                    }
                }
            }

            let attempt = self.attempt.saturating_add(1);
            if !self.backoff.allows(attempt) {
                warn!("giving up after {} reconnect attempt(s)", self.attempt);
                return None;
            }
            let delay = self.backoff.delay(attempt);
            let deadline = *self.retry_at.get_or_insert_with(|| Instant::now() + delay);
            tokio::time::sleep_until(deadline).await;

            let result = self.connector.connect().await;
            self.retry_at = None;
            self.attempt = attempt;
            match result {
                Ok(transport) => {
                    info!("channel reconnected after {attempt} attempt(s)");
                    self.current = Some(transport);
                }
                Err(e) => warn!("reconnect attempt {attempt} failed: {e}"),
            }
        }
    }

    async fn close(&mut self) -> Result<(), Connect4Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.current.take() {
            Some(mut transport) => transport.close().await,
            None => Ok(()),
        }
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
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    /// Replays a fixed script, then reports a clean close.
    struct ScriptedTransport {
        incoming: VecDeque<Result<String, Connect4Error>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, _message: String) -> Result<(), Connect4Error> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, Connect4Error>> {
            self.incoming.pop_front()
        }

        async fn close(&mut self) -> Result<(), Connect4Error> {
            Ok(())
        }
    }

    /// Each connect pops the next scripted session; `None` fails the handshake.
    #[derive(Clone)]
    struct ScriptedConnector {
        sessions: Arc<StdMutex<VecDeque<Option<Vec<Result<String, Connect4Error>>>>>>,
        connects: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(sessions: Vec<Option<Vec<Result<String, Connect4Error>>>>) -> Self {
            Self {
                sessions: Arc::new(StdMutex::new(sessions.into())),
                connects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self) -> Result<ScriptedTransport, Connect4Error> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().unwrap().pop_front() {
                Some(Some(incoming)) => Ok(ScriptedTransport {
                    incoming: incoming.into(),
                }),
                _ => Err(Connect4Error::Io(std::io::Error::other("refused"))),
            }
        }
    }

    /// First handshake succeeds with an empty session; later ones wait for
    /// `gate` and then deliver one message.
    #[derive(Clone)]
    struct GatedConnector {
        gate: Arc<tokio::sync::Notify>,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for GatedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self) -> Result<ScriptedTransport, Connect4Error> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n > 0 {
                self.gate.notified().await;
            }
            let incoming = if n == 0 {
                VecDeque::new()
            } else {
                VecDeque::from([Ok("back".to_owned())])
            };
            Ok(ScriptedTransport { incoming })
        }
    }

    fn fast() -> Backoff {
        Backoff::default()
            .with_initial(Duration::from_millis(1))
            .with_max(Duration::from_millis(4))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff::default()
            .with_initial(Duration::from_millis(100))
            .with_max(Duration::from_millis(500));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn backoff_attempt_limit() {
        let limited = Backoff::default().with_max_attempts(Some(2));
        assert!(limited.allows(2));
        assert!(!limited.allows(3));
        assert!(Backoff::default().with_max_attempts(None).allows(u32::MAX));
    }

    #[tokio::test]
    async fn reconnects_after_clean_close() {
        let connector = ScriptedConnector::new(vec![
            Some(vec![Ok("first".into())]),
            Some(vec![Ok("second".into())]),
        ]);
        let connects = Arc::clone(&connector.connects);
        let mut transport = Reconnecting::new(connector, fast())
            .connect()
            .await
            .unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "first");
        assert_eq!(transport.recv().await.unwrap().unwrap(), "second");
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn reconnects_after_error_and_failed_attempt() {
        let connector = ScriptedConnector::new(vec![
            Some(vec![Err(Connect4Error::TransportReceive("reset".into()))]),
            None,
            Some(vec![Ok("back".into())]),
        ]);
        let connects = Arc::clone(&connector.connects);
        let mut transport = Reconnecting::new(connector, fast())
            .connect()
            .await
            .unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "back");
        assert_eq!(connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_handshake_does_not_count_as_attempt() {
        let connector = GatedConnector {
            gate: Arc::new(tokio::sync::Notify::new()),
            connects: Arc::new(AtomicUsize::new(0)),
        };
        let gate = Arc::clone(&connector.gate);
        let connects = Arc::clone(&connector.connects);
        let mut transport = Reconnecting::new(connector, fast())
            .connect()
            .await
            .unwrap();

        // The channel ends at once; the retry then stalls in its handshake.
        let cancelled = tokio::time::timeout(Duration::from_millis(50), transport.recv()).await;
        assert!(cancelled.is_err());
        assert_eq!(transport.attempts(), 0);
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        gate.notify_one();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "back");
        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn gives_up_after_limit() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let connects = Arc::clone(&connector.connects);
        let mut transport = Reconnecting::new(connector, fast().with_max_attempts(Some(3)))
            .connect()
            .await
            .unwrap();

        assert!(transport.recv().await.is_none());
        // Initial handshake plus three retries.
        assert_eq!(connects.load(Ordering::SeqCst), 4);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn first_handshake_failure_is_returned() {
        let connector = ScriptedConnector::new(vec![None]);
        let result = Reconnecting::new(connector, fast()).connect().await;
        assert!(matches!(result, Err(Connect4Error::Io(_))));
    }

    #[tokio::test]
    async fn close_stops_reconnecting() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let connects = Arc::clone(&connector.connects);
        let mut transport = Reconnecting::new(connector, fast())
            .connect()
            .await
            .unwrap();

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.recv().await.is_none());
        assert!(matches!(
            transport.send("x".into()).await,
            Err(Connect4Error::TransportClosed)
        ));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }
}
