//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] opens a [`WebSocketTransport`] per connection
//! attempt. Both `ws://` and `wss://` are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), grimoire_live::SessionError> {
//! use grimoire_live::{Connector, Transport, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new();
//! let mut transport = connector.connect("wss://relay.example.com:8080/mygame/host").await?;
//! transport.send(r#"["ping",[0,null]]"#.to_string()).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use crate::error::SessionError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the relay closes without a status.
const NO_STATUS: u16 = 1005;

fn connect_error(err: tokio_tungstenite::tungstenite::Error) -> SessionError {
    match err {
        tokio_tungstenite::tungstenite::Error::Io(io) => SessionError::Io(io),
        other => SessionError::Connect(other.to_string()),
    }
}

/// Opens [`WebSocketTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a connection attempt with [`SessionError::Timeout`] after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, SessionError> {
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, WebSocketTransport::connect(url))
                .await
                .map_err(|_| SessionError::Timeout)?,
            None => WebSocketTransport::connect(url).await,
        }
    }
}

/// A [`Transport`] over one WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before
/// completion does not consume a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a full `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the socket cannot be opened and
    /// [`SessionError::Connect`] for any other handshake failure.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, "connecting to relay");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(connect_error)?;
        tracing::info!(url = %url, "relay connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportSend(
                "connection already closed".to_owned(),
            ));
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(SessionError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "relay sent close frame");
                    let (code, reason) = frame.map_or((NO_STATUS, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.to_string())
                    });
                    return Some(Err(SessionError::ConnectionClosed { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself
                }
                Message::Binary(_) => {
                    tracing::warn!("skipping unexpected binary frame");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: WsCloseCode::Normal,
            reason: "".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connect(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn connector_times_out() {
        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect("ws://192.0.2.1:1/abc/host").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
    }

    /// Accept one connection on a local listener and run `handler` on it.
    /// Returns the base URL.
    async fn start_relay<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_yields_text_frames() {
        let base = start_relay(|mut ws| async move {
            ws.send(Message::Text(r#"["isNight",true]"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"["bye","p-1"]"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new()
            .connect(&format!("{base}/abc/p-1"))
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"["isNight",true]"#);
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"["bye","p-1"]"#);
    }

    #[tokio::test]
    async fn close_frame_carries_code_and_reason() {
        let base = start_relay(|mut ws| async move {
            let frame = CloseFrame {
                code: WsCloseCode::Normal,
                reason: "The storyteller ended the game".into(),
            };
            ws.close(Some(frame)).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        match transport.recv().await {
            Some(Err(err @ SessionError::ConnectionClosed { .. })) => {
                assert!(err.is_normal_closure());
                assert!(err.to_string().contains("The storyteller ended the game"));
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let base =
            start_relay(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;
        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".to_owned()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportSend(_)));
    }

    #[tokio::test]
    async fn frames_reach_the_relay() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let base = start_relay(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        transport
            .send(r#"["ping",["p-1",null]]"#.to_owned())
            .await
            .unwrap();
        assert_eq!(seen_rx.await.unwrap(), r#"["ping",["p-1",null]]"#);
    }
}
