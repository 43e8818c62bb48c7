//! [`Connector`] and [`Connection`] backed by `tokio-tungstenite`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use secrecy::ExposeSecret as _;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::error::WsError;
use super::traits::{Connection, Connector, Frame, FrameKind};
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `ws://` and `wss://` endpoints.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, endpoint: &str, config: &Config) -> Result<WsConnection> {
        let request = upgrade_request(endpoint, config)?;
        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(config.max_message_size))
            .max_frame_size(Some(config.max_message_size));

        let (stream, _) = connect_async_with_config(request, Some(ws_config), false).await?;

        Ok(WsConnection::new(stream))
    }
}

/// Build the HTTP upgrade request, attaching the bearer credential and
/// subprotocols from `config`.
fn upgrade_request(endpoint: &str, config: &Config) -> Result<Request> {
    let mut request = endpoint.into_client_request()?;
    let headers = request.headers_mut();

    if let Some(token) = &config.bearer_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if !config.subprotocols.is_empty() {
        let protocols = config.subprotocols.join(", ");
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(&protocols)?);
    }

    Ok(request)
}

/// An established WebSocket session.
///
/// The stream is split so that the read loop can wait on the next frame while
/// the heartbeat (or a concurrent close) writes. PONG frames seen by the reader
/// are published to pending [`Connection::ping`] calls through a watch channel.
/// A failed ping trips `failed`, which wakes the reader with an error.
pub struct WsConnection {
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
    /// Time the most recent PONG was received
    pong_tx: watch::Sender<Instant>,
    failed: CancellationToken,
    closed: AtomicBool,
}

impl WsConnection {
    fn new(stream: WsStream) -> Self {
        let (writer, reader) = stream.split();
        let (pong_tx, _) = watch::channel(Instant::now());

        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            pong_tx,
            failed: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn read(&self) -> Result<Frame> {
        let mut reader = self.reader.lock().await;

        loop {
            let next = tokio::select! {
                () = self.failed.cancelled() => return Err(WsError::HeartbeatFailed.into()),
                next = reader.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Frame {
                        kind: FrameKind::Text,
                        payload: text.as_bytes().to_vec(),
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Frame {
                        kind: FrameKind::Binary,
                        payload: data.to_vec(),
                    });
                }
                Some(Ok(Message::Pong(_))) => {
                    self.pong_tx.send_replace(Instant::now());
                }
                Some(Ok(Message::Close(frame))) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?frame, "Peer closed WebSocket connection");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &frame;
                    return Err(WsError::ConnectionClosed.into());
                }
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => {
                    // tungstenite queues the PONG reply itself
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(WsError::ConnectionClosed.into()),
            }
        }
    }

    async fn ping(&self, ack_timeout: Duration) -> Result<()> {
        // Subscribing marks the current PONG as seen, so only a reply to this
        // PING wakes us up
        let mut pong_rx = self.pong_tx.subscribe();

        let probe = async {
            self.writer
                .lock()
                .await
                .send(Message::Ping(Bytes::new()))
                .await?;

            pong_rx
                .changed()
                .await
                .map_err(|_e| WsError::ConnectionClosed)?;

            Ok::<_, Error>(())
        };

        let outcome = if ack_timeout.is_zero() {
            probe.await
        } else {
            timeout(ack_timeout, probe)
                .await
                .unwrap_or_else(|_elapsed| Err(WsError::Timeout(ack_timeout).into()))
        };

        if outcome.is_err() {
            self.failed.cancel();
        }

        outcome
    }

    async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };

        match self.writer.lock().await.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn upgrade_request_attaches_bearer_token() {
        let config = Config::builder()
            .bearer_token(SecretString::from("abc123"))
            .build();

        let request = upgrade_request("ws://127.0.0.1:8081/ws", &config).expect("valid request");

        assert_eq!(
            request.headers().get(AUTHORIZATION).map(HeaderValue::as_bytes),
            Some(b"Bearer abc123".as_slice())
        );
    }

    #[test]
    fn upgrade_request_without_token_has_no_authorization() {
        let request = upgrade_request("ws://127.0.0.1:8081/ws", &Config::default())
            .expect("valid request");

        assert!(request.headers().get(AUTHORIZATION).is_none(), "no token configured");
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none(), "no subprotocols");
    }

    #[test]
    fn upgrade_request_offers_subprotocols() {
        let config = Config::builder()
            .subprotocols(vec!["json".to_owned(), "v11".to_owned()])
            .build();

        let request = upgrade_request("wss://example.com/ws", &config).expect("valid request");

        assert_eq!(
            request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .map(HeaderValue::as_bytes),
            Some(b"json, v11".as_slice())
        );
    }

    #[test]
    fn upgrade_request_rejects_invalid_url() {
        upgrade_request("not a url", &Config::default()).unwrap_err();
    }
}
