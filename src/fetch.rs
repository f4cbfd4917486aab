//! Bootstrap snapshot fetch over the request/response channel.
//!
//! The connection manager issues exactly one fetch per view, right after the
//! persistent channel opens. [`SnapshotSource`] is the seam; the default
//! implementation, [`HttpSnapshotSource`], performs `GET {api}/games/{id}/`
//! with `reqwest` (feature `http-fetch`, enabled by default).

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::MatchSnapshot;

/// Produces the authoritative snapshot of a match on request.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    /// Fetch the current snapshot of `match_id`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a bootstrap failure.
    async fn fetch(&self, match_id: &str) -> Result<MatchSnapshot>;
}

#[cfg(feature = "http-fetch")]
pub use http::HttpSnapshotSource;

#[cfg(feature = "http-fetch")]
mod http {
    use async_trait::async_trait;
    use tracing::debug;

    use super::SnapshotSource;
    use crate::config::ClientConfig;
    use crate::error::{Connect4Error, Result};
    use crate::protocol::MatchSnapshot;

    /// [`SnapshotSource`] backed by the game API over HTTP.
    #[derive(Debug, Clone)]
    pub struct HttpSnapshotSource {
        client: reqwest::Client,
        config: ClientConfig,
    }

    impl HttpSnapshotSource {
        /// Build a source using `config.api_base_url` and `config.request_timeout`.
        ///
        /// # Errors
        ///
        /// Returns [`Connect4Error::Fetch`] if the HTTP client cannot be built.
        pub fn new(config: &ClientConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .map_err(|e| Connect4Error::Fetch(e.to_string()))?;
            Ok(Self::with_client(client, config))
        }

        /// Build a source around an existing `reqwest` client.
        pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
            Self {
                client,
                config: config.clone(),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for HttpSnapshotSource {
        async fn fetch(&self, match_id: &str) -> Result<MatchSnapshot> {
            let url = self.config.snapshot_url(match_id);
            debug!(url = %url, "fetching match snapshot");

            let response = self.client.get(&url).send().await.map_err(|e| {
                if e.is_timeout() {
                    Connect4Error::Timeout
                } else {
                    Connect4Error::Fetch(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(Connect4Error::Http {
                    status: status.as_u16(),
                });
            }

            response.json::<MatchSnapshot>().await.map_err(|e| {
                if e.is_decode() {
                    Connect4Error::InvalidSnapshot(e.to_string())
                } else if e.is_timeout() {
                    Connect4Error::Timeout
                } else {
                    Connect4Error::Fetch(e.to_string())
                }
            })
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
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve one HTTP/1.1 response and report the request line.
        async fn serve_once(
            status_line: &'static str,
            body: &'static str,
        ) -> (String, tokio::sync::oneshot::Receiver<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = tokio::sync::oneshot::channel();

            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let first_line = request.lines().next().unwrap_or_default().to_string();
                let _ = tx.send(first_line);

                let response = format!(
                    "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            });

            (format!("http://{addr}"), rx)
        }

        /// Source that ignores proxy settings from the environment.
        fn local_source(base: String) -> HttpSnapshotSource {
            let config = ClientConfig::new(base, "ws://unused");
            let client = reqwest::Client::builder().no_proxy().build().unwrap();
            HttpSnapshotSource::with_client(client, &config)
        }

        #[tokio::test]
        async fn fetch_parses_snapshot_from_games_endpoint() {
            let (base, request_line) = serve_once(
                "HTTP/1.1 200 OK",
                r#"{"id":"m1","player1":"alice","player2":null,"board":[[0,0]],"moves":[],"move_number":0,"winner":null,"next_player_to_move_username":null,"finished_at":null}"#,
            )
            .await;

            let source = local_source(base);
            let snapshot = source.fetch("m1").await.unwrap();

            assert_eq!(snapshot.id, "m1");
            assert_eq!(snapshot.board.width(), 2);
            assert_eq!(request_line.await.unwrap(), "GET /games/m1/ HTTP/1.1");
        }

        #[tokio::test]
        async fn non_success_status_is_http_error() {
            let (base, _request_line) = serve_once("HTTP/1.1 404 Not Found", "{}").await;

            let source = local_source(base);
            let err = source.fetch("missing").await.unwrap_err();

            assert!(matches!(err, Connect4Error::Http { status: 404 }));
        }

        #[tokio::test]
        async fn malformed_body_is_invalid_snapshot() {
            let (base, _request_line) = serve_once("HTTP/1.1 200 OK", r#"{"id":"m1"}"#).await;

            let source = local_source(base);
            let err = source.fetch("m1").await.unwrap_err();

            assert!(matches!(err, Connect4Error::InvalidSnapshot(_)));
        }

        #[tokio::test]
        async fn unreachable_api_is_fetch_error() {
            let config = ClientConfig::new("http://127.0.0.1:1", "ws://unused");
            assert!(HttpSnapshotSource::new(&config).is_ok());
            let source = local_source("http://127.0.0.1:1".into());
            let err = source.fetch("m1").await.unwrap_err();

            assert!(matches!(
                err,
                Connect4Error::Fetch(_) | Connect4Error::Timeout
            ));
        }
    }
}
